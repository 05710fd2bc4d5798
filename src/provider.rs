//! Backend lookup by name.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Backend, BackendType};
use crate::config::{ProviderOptions, RemoteConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::local::{Emulator, LocalBackend};
use crate::remote::{CloudClient, RemoteBackend};
use crate::target::Target;

/// Entry point handing out backends by name.
///
/// ```
/// use pasqal_provider::PasqalProvider;
///
/// let provider = PasqalProvider::new();
/// assert!(provider.backends().contains(&"qutip"));
///
/// let backend = provider.get_backend("qutip", None).unwrap();
/// assert_eq!(backend.name(), "qutip");
///
/// let err = provider.get_backend("qpu", None).err().unwrap();
/// assert!(err.to_string().contains("remote configuration"));
/// ```
#[derive(Default)]
pub struct PasqalProvider {
    remote_config: Option<RemoteConfig>,
    options: ProviderOptions,
    emulators: FxHashMap<BackendType, Arc<dyn Emulator>>,
}

impl PasqalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose cloud credentials come from `PASQAL_*` variables, if
    /// any are set.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            remote_config: RemoteConfig::from_env()?,
            ..Self::default()
        })
    }

    pub fn with_remote_config(mut self, config: RemoteConfig) -> Self {
        self.remote_config = Some(config);
        self
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    /// Register the engine local backends of `backend_type` run on.
    pub fn with_emulator(
        mut self,
        backend_type: BackendType,
        emulator: Arc<dyn Emulator>,
    ) -> Self {
        self.emulators.insert(backend_type, emulator);
        self
    }

    pub fn remote_config(&self) -> Option<&RemoteConfig> {
        self.remote_config.as_ref()
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Names accepted by [`get_backend`](Self::get_backend).
    pub fn backends(&self) -> Vec<&'static str> {
        BackendType::list()
    }

    /// The backend called `name`, running on `target`.
    ///
    /// Local backends default to the analog device. Remote backends fetch
    /// the Fresnel specs on first use when no target is given.
    pub fn get_backend(
        &self,
        name: &str,
        target: Option<Target>,
    ) -> ProviderResult<Arc<dyn Backend>> {
        let backend_type: BackendType = name.parse()?;
        debug!("Creating backend {}", backend_type);

        if !backend_type.is_remote() {
            let mut backend = LocalBackend::new(backend_type, target.unwrap_or_default())?
                .with_options(self.options);
            if let Some(emulator) = self.emulators.get(&backend_type) {
                backend = backend.with_emulator(Arc::clone(emulator));
            }
            return Ok(Arc::new(backend));
        }

        let config = self
            .remote_config
            .clone()
            .ok_or_else(|| ProviderError::MissingRemoteConfig(name.to_string()))?;
        let client = CloudClient::new(config)?;
        let backend = RemoteBackend::new(backend_type, client, target)?
            .with_poll_policy(self.options.poll_policy);
        Ok(Arc::new(backend))
    }
}

impl std::fmt::Debug for PasqalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let engines: Vec<&str> = self.emulators.keys().map(BackendType::as_str).collect();
        f.debug_struct("PasqalProvider")
            .field("remote_config", &self.remote_config)
            .field("options", &self.options)
            .field("emulators", &engines)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::layout::RegisterLayout;

    #[test]
    fn test_backends_listed() {
        let provider = PasqalProvider::new();
        assert_eq!(
            provider.backends(),
            vec![
                "qutip",
                "emu-mps",
                "remote-emu-free",
                "remote-emu-tn",
                "remote-emu-fresnel",
                "qpu"
            ]
        );
    }

    #[test]
    fn test_local_backend_without_config() {
        let provider = PasqalProvider::new();
        let backend = provider.get_backend("qutip", None).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Qutip);

        let layout = RegisterLayout::square(4, 4, 5.0).unwrap();
        let target = Target::from_type(DeviceType::Hybrid, Some(layout)).unwrap();
        assert!(provider.get_backend("qutip", Some(target)).is_ok());
    }

    #[test]
    fn test_remote_backends_need_config() {
        let provider = PasqalProvider::new();
        for name in ["remote-emu-free", "remote-emu-tn", "remote-emu-fresnel", "qpu"] {
            let err = provider.get_backend(name, None).err().unwrap();
            assert!(
                matches!(&err, ProviderError::MissingRemoteConfig(n) if n == name),
                "{err}"
            );
        }

        let provider = provider.with_remote_config(RemoteConfig::with_token("tok", "p"));
        let backend = provider.get_backend("remote-emu-tn", None).unwrap();
        assert_eq!(backend.name(), "remote-emu-tn");
    }

    #[test]
    fn test_unknown_backend() {
        let err = PasqalProvider::new().get_backend("fake-backend", None).err().unwrap();
        assert_eq!(err.to_string(), "fake-backend is not a valid backend");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let provider =
            PasqalProvider::new().with_remote_config(RemoteConfig::new("a", "hunter2", "p"));
        assert!(!format!("{provider:?}").contains("hunter2"));
    }
}
