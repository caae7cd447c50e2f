//! `Parameter<T>` - declarative parameter management.
//!
//! A `Parameter` is the single source of truth for one instrument setting.
//! It holds the current value in a tokio watch channel (so any number of
//! observers can subscribe to changes), carries metadata and validation
//! constraints, and can be connected to hardware through async write/read
//! callbacks.
//!
//! # Data flow
//!
//! `set()` validates against constraints first, then writes to hardware if
//! a writer is connected, then updates the stored value and notifies
//! subscribers. Validation happens BEFORE the hardware write so a failing
//! value never reaches the device.
//!
//! Hardware may accept a different value than requested (clamping to
//! device-reported bounds is the normal case for exposure and gain); call
//! `read_from_hardware()` after a set to sync the applied value back, or
//! `update_from_hardware()` when the driver already holds it. Both bypass
//! validation: the device is the source of truth.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{CamError, CamResult};

type Validator<T> = Arc<dyn Fn(&T) -> CamResult<()> + Send + Sync>;
type HardwareWriter<T> = Arc<dyn Fn(T) -> BoxFuture<'static, CamResult<()>> + Send + Sync>;
type HardwareReader<T> = Arc<dyn Fn() -> BoxFuture<'static, CamResult<T>> + Send + Sync>;

/// Metadata describing a parameter, exposed for introspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterMetadata {
    /// Parameter name, unique within a device (e.g. "acquisition.exposure_us").
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Physical units (e.g. "us", "dB", "Hz").
    pub units: Option<String>,

    /// Read-only parameters reject `set()` calls.
    pub read_only: bool,

    /// Lower bound for numeric parameters, if constrained.
    pub min_value: Option<f64>,

    /// Upper bound for numeric parameters, if constrained.
    pub max_value: Option<f64>,

    /// Allowed values for enumerated parameters, if constrained.
    pub choices: Vec<String>,
}

struct SharedState<T> {
    metadata: ParameterMetadata,
    validator: Option<Validator<T>>,
}

/// Typed parameter with watch-channel distribution and optional hardware
/// synchronization.
pub struct Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<SharedState<T>>>,
    hardware_writer: Option<HardwareWriter<T>>,
    hardware_reader: Option<HardwareReader<T>>,
}

impl<T> Clone for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
            hardware_writer: self.hardware_writer.clone(),
            hardware_reader: self.hardware_reader.clone(),
        }
    }
}

impl<T> Debug for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Parameter")
            .field("metadata", &shared.metadata)
            .field("value", &*self.sender.borrow())
            .field("has_validator", &shared.validator.is_some())
            .field("has_hardware_writer", &self.hardware_writer.is_some())
            .finish()
    }
}

impl<T> Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    /// Create a new parameter with an initial value.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            shared: Arc::new(RwLock::new(SharedState {
                metadata: ParameterMetadata {
                    name: name.into(),
                    ..ParameterMetadata::default()
                },
                validator: None,
            })),
            hardware_writer: None,
            hardware_reader: None,
        }
    }

    /// Set the parameter description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Set the parameter unit.
    pub fn with_unit(self, unit: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(unit.into());
        self
    }

    /// Make the parameter read-only.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Add a range validator (validation only; for numeric parameters that
    /// should also advertise their bounds, see the type-specific
    /// `with_range_introspectable`).
    pub fn with_range(self, min: T, max: T) -> Self
    where
        T: PartialOrd,
    {
        let name = self.shared.read().metadata.name.clone();
        self.shared.write().validator = Some(Arc::new(move |value: &T| {
            if value < &min || value > &max {
                Err(CamError::ParameterOutOfRange {
                    name: name.clone(),
                    detail: format!("value {:?} out of range [{:?}, {:?}]", value, min, max),
                })
            } else {
                Ok(())
            }
        }));
        self
    }

    /// Add a discrete-choice validator.
    pub fn with_choices(self, choices: Vec<T>) -> Self {
        let name = self.shared.read().metadata.name.clone();
        self.shared.write().validator = Some(Arc::new(move |value: &T| {
            if choices.iter().any(|c| c == value) {
                Ok(())
            } else {
                Err(CamError::ParameterInvalidChoice {
                    name: name.clone(),
                    value: format!("{:?}", value),
                })
            }
        }));
        self
    }

    /// Connect the hardware write function. After this, `set()` writes to
    /// hardware before updating the stored value.
    pub fn connect_to_hardware_write(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, CamResult<()>> + Send + Sync + 'static,
    ) {
        self.hardware_writer = Some(Arc::new(writer));
    }

    /// Connect the hardware read function used by `read_from_hardware()`.
    pub fn connect_to_hardware_read(
        &mut self,
        reader: impl Fn() -> BoxFuture<'static, CamResult<T>> + Send + Sync + 'static,
    ) {
        self.hardware_reader = Some(Arc::new(reader));
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Validate a value without setting it.
    pub fn validate(&self, value: &T) -> CamResult<()> {
        let guard = self.shared.read();
        if guard.metadata.read_only {
            return Err(CamError::ParameterReadOnly(guard.metadata.name.clone()));
        }
        if let Some(validator) = &guard.validator {
            validator(value)?;
        }
        Ok(())
    }

    /// Set a new value: validate, write to hardware if connected, then
    /// update the stored value and notify subscribers.
    pub async fn set(&self, value: T) -> CamResult<()> {
        self.validate(&value)?;

        if let Some(writer) = &self.hardware_writer {
            writer(value.clone()).await?;
        }

        tracing::trace!(parameter = %self.name(), value = ?value, "parameter set");
        self.sender.send_replace(value);
        Ok(())
    }

    /// Fetch the current value from hardware and store it.
    ///
    /// Bypasses validation: the hardware value is authoritative, including
    /// for read-only parameters.
    pub async fn read_from_hardware(&self) -> CamResult<()> {
        let reader = self.hardware_reader.as_ref().ok_or_else(|| {
            CamError::ParameterNoHardwareReader(self.shared.read().metadata.name.clone())
        })?;
        let value = reader().await?;
        self.sender.send_replace(value);
        Ok(())
    }

    /// Store a value the driver already read from hardware.
    ///
    /// Bypasses validation for the same reason as `read_from_hardware()`;
    /// used by background polls that refresh read-only parameters.
    pub fn update_from_hardware(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Get the parameter name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Get a snapshot of the parameter metadata.
    pub fn metadata(&self) -> ParameterMetadata {
        self.shared.read().metadata.clone()
    }

    /// Whether the parameter rejects writes.
    pub fn is_read_only(&self) -> bool {
        self.shared.read().metadata.read_only
    }

    /// Whether any subscriber is listening.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Parameter<f64> {
    /// Range validation that also populates the introspectable min/max
    /// metadata. Rejects NaN.
    pub fn with_range_introspectable(self, min: f64, max: f64) -> Self {
        debug_assert!(min <= max);
        {
            let mut guard = self.shared.write();
            guard.metadata.min_value = Some(min);
            guard.metadata.max_value = Some(max);
        }
        let name = self.shared.read().metadata.name.clone();
        self.shared.write().validator = Some(Arc::new(move |value: &f64| {
            if value.is_nan() || *value < min || *value > max {
                Err(CamError::ParameterOutOfRange {
                    name: name.clone(),
                    detail: format!("value {} out of range [{}, {}]", value, min, max),
                })
            } else {
                Ok(())
            }
        }));
        self
    }
}

impl Parameter<String> {
    /// Choice validation that also populates the introspectable choices
    /// metadata.
    pub fn with_choices_introspectable(self, choices: Vec<String>) -> Self {
        self.shared.write().metadata.choices = choices.clone();
        let name = self.shared.read().metadata.name.clone();
        self.shared.write().validator = Some(Arc::new(move |value: &String| {
            if choices.iter().any(|c| c == value) {
                Ok(())
            } else {
                Err(CamError::ParameterInvalidChoice {
                    name: name.clone(),
                    value: value.clone(),
                })
            }
        }));
        self
    }
}

// =============================================================================
// ParameterBase - type-erased access
// =============================================================================

/// Base trait for all parameters, providing type-erased access so a device
/// can expose its full parameter table generically.
pub trait ParameterBase: Send + Sync {
    /// Parameter name.
    fn name(&self) -> String;

    /// Current value as JSON.
    fn get_json(&self) -> CamResult<serde_json::Value>;

    /// Set the value from JSON (validates like `set()`).
    fn set_json(&self, value: serde_json::Value) -> CamResult<()>;

    /// Metadata snapshot.
    fn metadata(&self) -> ParameterMetadata;
}

impl<T> ParameterBase for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> String {
        Parameter::name(self)
    }

    fn get_json(&self) -> CamResult<serde_json::Value> {
        serde_json::to_value(self.get()).map_err(|e| CamError::ParameterJson {
            name: Parameter::name(self),
            message: e.to_string(),
        })
    }

    fn set_json(&self, value: serde_json::Value) -> CamResult<()> {
        let typed: T = serde_json::from_value(value).map_err(|e| CamError::ParameterJson {
            name: Parameter::name(self),
            message: e.to_string(),
        })?;
        futures::executor::block_on(self.set(typed))
    }

    fn metadata(&self) -> ParameterMetadata {
        Parameter::metadata(self)
    }
}

// =============================================================================
// ParameterSet - named registry
// =============================================================================

/// Name-keyed registry of type-erased parameters.
#[derive(Default)]
pub struct ParameterSet {
    parameters: HashMap<String, Box<dyn ParameterBase>>,
}

impl Debug for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSet")
            .field("len", &self.parameters.len())
            .field("names", &self.names())
            .finish()
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter under its own name.
    pub fn register<P>(&mut self, parameter: P)
    where
        P: ParameterBase + 'static,
    {
        let name = parameter.name();
        self.parameters.insert(name, Box::new(parameter));
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&dyn ParameterBase> {
        self.parameters.get(name).map(|p| p.as_ref())
    }

    /// Iterate over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ParameterBase)> {
        self.parameters
            .iter()
            .map(|(name, param)| (name.as_str(), param.as_ref()))
    }

    /// All registered names.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[tokio::test]
    async fn parameter_basic() {
        let param = Parameter::new("test", 42.0);
        assert_eq!(param.get(), 42.0);

        param.set(100.0).await.unwrap();
        assert_eq!(param.get(), 100.0);
    }

    #[tokio::test]
    async fn parameter_range_validation() {
        let param = Parameter::new("test", 50.0).with_range(0.0, 100.0);

        assert!(param.set(50.0).await.is_ok());
        assert!(param.set(150.0).await.is_err());
        assert!(param.set(-10.0).await.is_err());
    }

    #[tokio::test]
    async fn parameter_introspectable_range_rejects_nan() {
        let param = Parameter::new("exposure", 100.0).with_range_introspectable(1.0, 10000.0);

        assert!(param.set(f64::NAN).await.is_err());
        assert_eq!(param.metadata().min_value, Some(1.0));
        assert_eq!(param.metadata().max_value, Some(10000.0));
    }

    #[tokio::test]
    async fn parameter_choices() {
        let param = Parameter::new("mode", "None".to_string())
            .with_choices_introspectable(vec!["None".into(), "Software".into()]);

        assert!(param.set("Software".to_string()).await.is_ok());
        assert!(param.set("Bogus".to_string()).await.is_err());
        assert_eq!(param.metadata().choices.len(), 2);
    }

    #[tokio::test]
    async fn parameter_read_only() {
        let param = Parameter::new("serial", "22421982".to_string()).read_only();

        assert!(param.set("other".to_string()).await.is_err());
        assert_eq!(param.get(), "22421982");

        // Hardware refresh still works on read-only parameters.
        param.update_from_hardware("22421983".to_string());
        assert_eq!(param.get(), "22421983");
    }

    #[tokio::test]
    async fn parameter_validates_before_hardware_write() {
        let write_called = Arc::new(AtomicBool::new(false));
        let called = write_called.clone();

        let mut param = Parameter::new("exposure", 50.0).with_range(0.0, 100.0);
        param.connect_to_hardware_write(move |_val| {
            let called = called.clone();
            Box::pin(async move {
                called.store(true, Ordering::SeqCst);
                Ok(())
            })
        });

        assert!(param.set(150.0).await.is_err());
        assert!(
            !write_called.load(Ordering::SeqCst),
            "hardware write must not run when validation fails"
        );
        assert_eq!(param.get(), 50.0);

        assert!(param.set(75.0).await.is_ok());
        assert!(write_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn parameter_hardware_read_back() {
        let hardware_value = Arc::new(AtomicU64::new(1234));
        let hw = hardware_value.clone();

        let mut param = Parameter::new("exposure", 0.0);
        param.connect_to_hardware_read(move || {
            let hw = hw.clone();
            Box::pin(async move { Ok(hw.load(Ordering::SeqCst) as f64) })
        });

        param.read_from_hardware().await.unwrap();
        assert_eq!(param.get(), 1234.0);
    }

    #[tokio::test]
    async fn parameter_subscription() {
        let param = Parameter::new("test", 0.0);
        let mut rx = param.subscribe();
        assert_eq!(*rx.borrow(), 0.0);

        param.set(42.0).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42.0);
    }

    #[tokio::test]
    async fn parameter_set_registry() {
        let exposure = Parameter::new("acquisition.exposure_us", 5000.0).with_unit("us");
        let trigger = Parameter::new("acquisition.trigger_mode", "None".to_string())
            .with_choices_introspectable(vec!["None".into(), "Software".into()]);

        let mut set = ParameterSet::new();
        set.register(exposure.clone());
        set.register(trigger.clone());

        assert_eq!(set.len(), 2);
        let looked_up = set.get("acquisition.exposure_us").unwrap();
        assert_eq!(looked_up.get_json().unwrap(), serde_json::json!(5000.0));

        let trig = set.get("acquisition.trigger_mode").unwrap();
        assert!(trig.set_json(serde_json::json!("Software")).is_ok());
        assert!(trig.set_json(serde_json::json!("Bogus")).is_err());
        assert_eq!(trigger.get(), "Software");
    }
}
