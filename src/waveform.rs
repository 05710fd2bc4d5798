//! Interpolated waveforms for amplitude, detuning and phase.
//!
//! [`InterpolatePoints`] is the user-facing description: a handful of
//! (possibly symbolic) points spread over a duration. Binding parameter
//! values turns it into a concrete [`Waveform`] that can be sampled once
//! per nanosecond.
//!
//! Knot `k` of a waveform of duration `D` sits at `times[k] * (D - 1)` ns.
//! When no times are given the knots are evenly spaced over `[0, 1]`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::parameter::{ParameterExpression, ParameterValues};

/// Duration (ns) used when none is given.
pub const DEFAULT_DURATION: u32 = 1000;

/// Interpolation scheme between waveform points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolator {
    /// Piecewise cubic Hermite, shape preserving.
    #[default]
    #[serde(rename = "PchipInterpolator")]
    Pchip,
    /// Piecewise linear.
    #[serde(rename = "interp1d")]
    Linear,
}

impl Interpolator {
    /// Name used in serialized sequences.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolator::Pchip => "PchipInterpolator",
            Interpolator::Linear => "interp1d",
        }
    }
}

impl fmt::Display for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolator {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PchipInterpolator" | "pchip" => Ok(Interpolator::Pchip),
            "interp1d" | "linear" => Ok(Interpolator::Linear),
            other => Err(ProviderError::InvalidWaveform(format!(
                "unknown interpolator '{other}'"
            ))),
        }
    }
}

/// Points of a waveform, interpolated over its duration.
///
/// Values and duration may reference parameters. A symbolic duration must
/// be a bare parameter; compound expressions are rejected.
///
/// ```
/// use pasqal_provider::{parameter, InterpolatePoints};
///
/// let p = parameter("p");
/// let wf = InterpolatePoints::new([
///     0.0.into(),
///     p.clone() / 3.0,
///     2.0 * p.clone() / 3.0,
///     p,
/// ])
/// .unwrap()
/// .with_duration(parameter("t"))
/// .unwrap();
///
/// assert_eq!(wf.len(), 4);
/// assert_eq!(wf.parameters(), vec!["p", "t"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatePoints {
    values: Vec<ParameterExpression>,
    duration: ParameterExpression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    times: Option<Vec<f64>>,
    #[serde(default)]
    interpolator: Interpolator,
}

impl InterpolatePoints {
    /// Create waveform points with the default duration and interpolator.
    ///
    /// At least two values are required.
    pub fn new<I, V>(values: I) -> ProviderResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterExpression>,
    {
        let values: Vec<ParameterExpression> = values.into_iter().map(Into::into).collect();
        if values.len() < 2 {
            return Err(ProviderError::InvalidWaveform(format!(
                "at least 2 values are needed, got {}",
                values.len()
            )));
        }
        if let Some(bad) = values
            .iter()
            .filter_map(ParameterExpression::as_f64)
            .find(|v| !v.is_finite())
        {
            return Err(ProviderError::InvalidWaveform(format!(
                "values must be finite, got {bad}"
            )));
        }
        Ok(Self {
            values,
            duration: ParameterExpression::from(DEFAULT_DURATION),
            times: None,
            interpolator: Interpolator::default(),
        })
    }

    /// Set the duration in ns, or a parameter standing for it.
    pub fn with_duration(mut self, duration: impl Into<ParameterExpression>) -> ProviderResult<Self> {
        let duration = duration.into();
        if duration.is_symbolic() {
            if duration.as_symbol().is_none() {
                return Err(ProviderError::InvalidWaveform(format!(
                    "duration must be an integer or a single parameter, got {duration}"
                )));
            }
        } else {
            let value = duration.as_f64().unwrap_or(f64::NAN);
            duration_to_ns(value)?;
        }
        self.duration = duration;
        Ok(self)
    }

    /// Set the knot positions as fractions of the duration.
    pub fn with_times(mut self, times: Vec<f64>) -> ProviderResult<Self> {
        validate_times(&times, self.values.len())?;
        self.times = Some(times);
        Ok(self)
    }

    /// Choose the interpolation scheme.
    pub fn with_interpolator(mut self, interpolator: Interpolator) -> Self {
        self.interpolator = interpolator;
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; construction requires at least two points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[ParameterExpression] {
        &self.values
    }

    pub fn duration(&self) -> &ParameterExpression {
        &self.duration
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }

    pub fn interpolator(&self) -> Interpolator {
        self.interpolator
    }

    /// Sorted names of every parameter in values and duration.
    pub fn parameters(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        self.collect_parameters(&mut set);
        set.into_iter().collect()
    }

    pub(crate) fn collect_parameters(&self, set: &mut BTreeSet<String>) {
        for value in &self.values {
            value.collect_symbols(set);
        }
        self.duration.collect_symbols(set);
    }

    /// Whether every point is the same expression.
    pub fn is_constant(&self) -> bool {
        self.values.windows(2).all(|w| w[0] == w[1])
    }

    /// Evaluate every point and the duration into a concrete waveform.
    pub fn bind(&self, values: &ParameterValues) -> ProviderResult<Waveform> {
        let duration = duration_to_ns(self.duration.evaluate(values)?)?;
        let points = self
            .values
            .iter()
            .map(|v| v.evaluate(values))
            .collect::<ProviderResult<Vec<_>>>()?;
        Waveform::new(duration, points, self.times.clone(), self.interpolator)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_to_ns(value: f64) -> ProviderResult<u32> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(ProviderError::InvalidWaveform(format!(
            "duration must be a positive integer number of ns, got {value}"
        )));
    }
    Ok(value as u32)
}

fn validate_times(times: &[f64], n_values: usize) -> ProviderResult<()> {
    if times.len() != n_values {
        return Err(ProviderError::InvalidWaveform(format!(
            "times must have one entry per value ({n_values}), got {}",
            times.len()
        )));
    }
    if times.iter().any(|t| !(0.0..=1.0).contains(t)) {
        return Err(ProviderError::InvalidWaveform(
            "times must lie in [0, 1]".into(),
        ));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ProviderError::InvalidWaveform(
            "times must be strictly increasing".into(),
        ));
    }
    Ok(())
}

/// A concrete interpolated waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename = "interpolated", try_from = "WaveformRepr")]
pub struct Waveform {
    duration: u32,
    values: Vec<f64>,
    times: Vec<f64>,
    interpolator: Interpolator,
}

/// Unchecked wire form of [`Waveform`].
#[derive(Deserialize)]
#[serde(tag = "kind", rename = "interpolated")]
struct WaveformRepr {
    duration: u32,
    values: Vec<f64>,
    times: Vec<f64>,
    interpolator: Interpolator,
}

impl TryFrom<WaveformRepr> for Waveform {
    type Error = ProviderError;

    fn try_from(repr: WaveformRepr) -> ProviderResult<Self> {
        Waveform::new(repr.duration, repr.values, Some(repr.times), repr.interpolator)
    }
}

impl Waveform {
    /// Create a waveform. Without `times` the points are evenly spaced.
    pub fn new(
        duration: u32,
        values: Vec<f64>,
        times: Option<Vec<f64>>,
        interpolator: Interpolator,
    ) -> ProviderResult<Self> {
        if duration == 0 {
            return Err(ProviderError::InvalidWaveform(
                "duration must be positive".into(),
            ));
        }
        if values.len() < 2 {
            return Err(ProviderError::InvalidWaveform(format!(
                "at least 2 values are needed, got {}",
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidWaveform(format!(
                "values must be finite, got {bad}"
            )));
        }
        let times = match times {
            Some(times) => {
                validate_times(&times, values.len())?;
                times
            }
            None => linspace(values.len()),
        };
        Ok(Self {
            duration,
            values,
            times,
            interpolator,
        })
    }

    /// A flat waveform.
    pub fn constant(duration: u32, value: f64) -> ProviderResult<Self> {
        Self::new(duration, vec![value, value], None, Interpolator::Linear)
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn interpolator(&self) -> Interpolator {
        self.interpolator
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Largest point. Sampling never exceeds it.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest point. Sampling never goes below it.
    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn knots(&self) -> Vec<f64> {
        let span = f64::from(self.duration - 1);
        self.times.iter().map(|t| t * span).collect()
    }

    /// Value at time `t` (ns). Outside the knot range the nearest end value is held.
    pub fn sample_at(&self, t: f64) -> f64 {
        let knots = self.knots();
        let n = knots.len();
        if self.duration == 1 || t <= knots[0] {
            return self.values[0];
        }
        if t >= knots[n - 1] {
            return self.values[n - 1];
        }
        let k = knots.partition_point(|&x| x <= t).saturating_sub(1).min(n - 2);
        match self.interpolator {
            Interpolator::Linear => {
                let s = (t - knots[k]) / (knots[k + 1] - knots[k]);
                self.values[k] + s * (self.values[k + 1] - self.values[k])
            }
            Interpolator::Pchip => {
                let slopes = pchip_slopes(&knots, &self.values);
                hermite(&knots, &self.values, &slopes, k, t)
            }
        }
    }

    /// One sample per ns, `duration` samples in total.
    pub fn samples(&self) -> Vec<f64> {
        let knots = self.knots();
        let n = knots.len();
        let slopes = match self.interpolator {
            Interpolator::Pchip => pchip_slopes(&knots, &self.values),
            Interpolator::Linear => Vec::new(),
        };
        let mut k = 0;
        (0..self.duration)
            .map(|i| {
                let t = f64::from(i);
                if self.duration == 1 || t <= knots[0] {
                    return self.values[0];
                }
                if t >= knots[n - 1] {
                    return self.values[n - 1];
                }
                while k + 2 < n && t >= knots[k + 1] {
                    k += 1;
                }
                match self.interpolator {
                    Interpolator::Linear => {
                        let s = (t - knots[k]) / (knots[k + 1] - knots[k]);
                        self.values[k] + s * (self.values[k + 1] - self.values[k])
                    }
                    Interpolator::Pchip => hermite(&knots, &self.values, &slopes, k, t),
                }
            })
            .collect()
    }

    /// Area under the waveform, with samples in rad/µs and time in µs.
    pub fn integral(&self) -> f64 {
        self.samples().iter().sum::<f64>() * 1e-3
    }
}

#[allow(clippy::cast_precision_loss)]
fn linspace(n: usize) -> Vec<f64> {
    let last = (n - 1) as f64;
    (0..n).map(|i| i as f64 / last).collect()
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Fritsch–Carlson derivatives with the three-point edge rule.
fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();
    if n == 2 {
        return vec![delta[0]; 2];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if sign(delta[k - 1]) * sign(delta[k]) > 0 {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
        }
    }
    d[0] = edge_slope(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}

fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn hermite(x: &[f64], y: &[f64], d: &[f64], k: usize, t: f64) -> f64 {
    let h = x[k + 1] - x[k];
    let s = (t - x[k]) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    h00 * y[k] + h10 * h * d[k] + h01 * y[k + 1] + h11 * h * d[k + 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::parameter;

    #[test]
    fn test_interpolate_points_parametric() {
        let p = parameter("p");
        let t = parameter("t");
        let values = vec![
            ParameterExpression::from(0.0),
            p.clone() / 3.0,
            2.0 * p.clone() / 3.0,
            p,
        ];

        let wf = InterpolatePoints::new(values.clone())
            .unwrap()
            .with_duration(t.clone())
            .unwrap();
        assert_eq!(wf.len(), 4);
        assert_eq!(wf.duration(), &t);

        let wf2 = InterpolatePoints::new(values)
            .unwrap()
            .with_duration(t)
            .unwrap()
            .with_times(vec![0.0, 0.2, 0.6, 1.0])
            .unwrap();
        assert_eq!(wf2.times(), Some(&[0.0, 0.2, 0.6, 1.0][..]));
    }

    #[test]
    fn test_default_duration() {
        let wf = InterpolatePoints::new([0.0, 0.0]).unwrap();
        assert_eq!(wf.duration().as_f64(), Some(1000.0));
        assert_eq!(wf.interpolator(), Interpolator::Pchip);
    }

    #[test]
    fn test_invalid_duration() {
        let wf = InterpolatePoints::new([0.0, 1.0]).unwrap();
        assert!(wf.clone().with_duration(0.5).is_err());
        assert!(wf.clone().with_duration(-10.0).is_err());
        assert!(wf.with_duration(parameter("t") * 2.0).is_err());
    }

    #[test]
    fn test_invalid_times() {
        let wf = InterpolatePoints::new([0.0, 1.0, 0.0]).unwrap();
        assert!(wf.clone().with_times(vec![0.0, 1.0]).is_err());
        assert!(wf.clone().with_times(vec![0.0, 0.7, 0.5]).is_err());
        assert!(wf.with_times(vec![0.0, 0.5, 1.5]).is_err());
    }

    #[test]
    fn test_too_few_values() {
        assert!(InterpolatePoints::new([1.0]).is_err());
    }

    #[test]
    fn test_bind_and_sample_knots() {
        let p = parameter("omega");
        let wf = InterpolatePoints::new([0.0.into(), p.clone(), 0.0.into()])
            .unwrap()
            .with_duration(101u32)
            .unwrap();
        let bound = wf.bind(&ParameterValues::new().with("omega", 2.0)).unwrap();

        let samples = bound.samples();
        assert_eq!(samples.len(), 101);
        assert!((samples[0] - 0.0).abs() < 1e-12);
        assert!((samples[50] - 2.0).abs() < 1e-12);
        assert!((samples[100] - 0.0).abs() < 1e-12);
        assert!(samples.iter().all(|&s| (0.0..=2.0 + 1e-12).contains(&s)));
    }

    #[test]
    fn test_pchip_monotone_data_stays_monotone() {
        let bound = Waveform::new(
            500,
            vec![0.0, 0.1, 3.0, 3.1, 6.0],
            None,
            Interpolator::Pchip,
        )
        .unwrap();
        let samples = bound.samples();
        assert!(samples.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        assert!((bound.sample_at(499.0) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_sampling() {
        let bound = Waveform::new(11, vec![0.0, 1.0], None, Interpolator::Linear).unwrap();
        assert!((bound.sample_at(5.0) - 0.5).abs() < 1e-12);
        assert!((bound.integral() - 5.5e-3).abs() < 1e-12);
    }

    #[test]
    fn test_bind_unbound_parameter() {
        let wf = InterpolatePoints::new([parameter("a"), parameter("a")]).unwrap();
        assert!(wf.is_constant());
        assert!(matches!(
            wf.bind(&ParameterValues::new()),
            Err(ProviderError::UnboundParameter(_))
        ));
    }

    #[test]
    fn test_bind_rejects_non_finite_values() {
        let wf = InterpolatePoints::new([0.0.into(), parameter("omega"), 0.0.into()]).unwrap();
        for bad in [f64::NAN, f64::INFINITY] {
            let err = wf.bind(&ParameterValues::new().with("omega", bad)).unwrap_err();
            assert!(
                err.to_string().contains("values must be finite"),
                "{err}"
            );
        }
        assert!(Waveform::new(10, vec![0.0, f64::NAN], None, Interpolator::Linear).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let bound = Waveform::new(100, vec![0.0, 1.0, 0.0], None, Interpolator::Linear).unwrap();
        let json = serde_json::to_string(&bound).unwrap();
        assert_eq!(serde_json::from_str::<Waveform>(&json).unwrap(), bound);

        let malformed = [
            r#"{"kind":"interpolated","duration":0,"values":[],"times":[],"interpolator":"interp1d"}"#,
            r#"{"kind":"interpolated","duration":10,"values":[0.0,1.0],"times":[0.5,0.2],"interpolator":"interp1d"}"#,
            r#"{"kind":"interpolated","duration":10,"values":[0.0],"times":[0.0],"interpolator":"interp1d"}"#,
        ];
        for raw in malformed {
            assert!(serde_json::from_str::<Waveform>(raw).is_err(), "{raw}");
        }
    }
}
