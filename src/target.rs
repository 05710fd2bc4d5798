//! Execution targets: a device plus the layout jobs will use.

use crate::device::{Device, DeviceType};
use crate::error::{ProviderError, ProviderResult};
use crate::layout::RegisterLayout;
use crate::remote::{CloudClient, DEFAULT_DEVICE};

/// A device together with the trap layout selected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    device: Device,
    layout: RegisterLayout,
}

impl Target {
    /// Pair `device` with a layout.
    ///
    /// Without a layout the device's first pre-calibrated layout is used.
    /// A given layout must be acceptable to the device: either one of its
    /// calibrated layouts, or any layout if the device has none and accepts
    /// new ones.
    pub fn new(device: Device, layout: Option<RegisterLayout>) -> ProviderResult<Self> {
        let layout = Self::resolve_layout(&device, layout)?;
        Ok(Self { device, layout })
    }

    /// Target for a named local device. Fresnel has to be fetched from the
    /// cloud instead.
    pub fn from_type(device_type: DeviceType, layout: Option<RegisterLayout>) -> ProviderResult<Self> {
        let device = device_type.device().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "device '{device_type}' is described by the cloud; fetch it with a remote backend"
            ))
        })?;
        Self::new(device, layout)
    }

    /// Target for the Fresnel QPU, as currently described by the cloud.
    pub async fn fetch(client: &CloudClient) -> ProviderResult<Self> {
        Self::fetch_device(client, DEFAULT_DEVICE).await
    }

    /// Target for a cloud device, on its first calibrated layout.
    pub async fn fetch_device(client: &CloudClient, name: &str) -> ProviderResult<Self> {
        let device = client.fetch_device(name).await?;
        Self::new(device, None)
    }

    fn resolve_layout(
        device: &Device,
        layout: Option<RegisterLayout>,
    ) -> ProviderResult<RegisterLayout> {
        let calibrated = &device.pre_calibrated_layouts;
        match layout {
            None => calibrated.first().cloned().ok_or_else(|| {
                ProviderError::InvalidLayout(format!(
                    "a layout needs to be provided for device {}",
                    device.name
                ))
            }),
            Some(_) if !device.accepts_new_layouts => Err(ProviderError::InvalidLayout(
                format!("device {} does not accept new layouts", device.name),
            )),
            Some(layout) if calibrated.is_empty() || device.is_calibrated_layout(&layout) => {
                Ok(layout)
            }
            Some(_) => Err(ProviderError::InvalidLayout(
                "layout does not match the pre-calibrated layouts.".into(),
            )),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn layout(&self) -> &RegisterLayout {
        &self.layout
    }

    /// Maximum number of atoms jobs on this target may use.
    pub fn num_qubits(&self) -> usize {
        let traps = self.layout.number_of_traps();
        self.device.max_atom_num.map_or(traps, |max| max.min(traps))
    }
}

impl Default for Target {
    /// The analog device on its calibrated layout.
    fn default() -> Self {
        let device = Device::analog();
        let layout = device.pre_calibrated_layouts[0].clone();
        Self { device, layout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_device() -> Device {
        Device {
            name: "CustomDevice".into(),
            pre_calibrated_layouts: Vec::new(),
            accepts_new_layouts: true,
            ..Device::analog()
        }
    }

    #[test]
    fn test_analog_target() {
        let target = Target::from_type(DeviceType::Analog, None).unwrap();
        assert_eq!(target.device().name, "PasqalDevice1");
        assert_eq!(target.layout().number_of_traps(), 61);
        assert_eq!(target.num_qubits(), 25);

        let square = RegisterLayout::square(7, 4, 5.0).unwrap();
        assert!(Target::from_type(DeviceType::Analog, Some(square)).is_err());
    }

    #[test]
    fn test_hybrid_target() {
        let err = Target::from_type(DeviceType::Hybrid, None).unwrap_err();
        assert!(err.to_string().contains("a layout needs to be provided"));

        let square = RegisterLayout::square(7, 4, 5.0).unwrap();
        let target = Target::from_type(DeviceType::Hybrid, Some(square.clone())).unwrap();
        assert_eq!(target.layout(), &square);
    }

    #[test]
    fn test_custom_device_target() {
        assert!(Target::new(custom_device(), None).is_err());

        let square = RegisterLayout::square(7, 4, 5.0).unwrap();
        assert!(Target::new(custom_device(), Some(square)).is_ok());
    }

    #[test]
    fn test_calibrated_layout_required() {
        let calibrated = RegisterLayout::triangular(61, 5.0).unwrap();
        let device = Device {
            accepts_new_layouts: true,
            ..Device::analog()
        };

        assert!(Target::new(device.clone(), Some(calibrated)).is_ok());

        let other = RegisterLayout::square(3, 3, 5.0).unwrap();
        let err = Target::new(device, Some(other)).unwrap_err();
        assert!(err.to_string().contains("layout does not match the pre-calibrated layouts."));
    }

    #[test]
    fn test_fresnel_needs_cloud() {
        assert!(Target::from_type(DeviceType::Fresnel, None).is_err());
    }

    #[test]
    fn test_default_target() {
        let target = Target::default();
        assert_eq!(target, Target::from_type(DeviceType::Analog, None).unwrap());
    }
}
