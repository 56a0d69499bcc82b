//! Capability registry.
//!
//! Binds one implementation per device name at startup.  Each device is
//! bound independently: a device disabled in the configuration, or whose
//! hardware setup fails, is recorded as [`Capability::Unavailable`] and
//! the rest of the system keeps running.  After loading, the table is
//! read-only until [`CapabilityTable::unload`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::app::ports::{Buzzer, Device, HalPort, Led, LightSensor, Segment};
use crate::config::SystemConfig;
use crate::drivers::buzzer::{BuzzerDriver, BuzzerTiming};
use crate::drivers::cds::{CdsDriver, CdsSettings};
use crate::drivers::led::LedDriver;
use crate::drivers::segment::{SegmentDriver, SegmentTiming};
use crate::error::{DeviceError, DeviceKind, Result};
use crate::shutdown::Shutdown;

/// A bound device, or the reason it is missing.
pub enum Capability<T: ?Sized> {
    Available(Arc<T>),
    Unavailable(String),
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Available(dev) => Self::Available(Arc::clone(dev)),
            Self::Unavailable(reason) => Self::Unavailable(reason.clone()),
        }
    }
}

impl<T: ?Sized> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    fn as_device(&self) -> Option<&Arc<T>> {
        match self {
            Self::Available(dev) => Some(dev),
            Self::Unavailable(_) => None,
        }
    }
}

/// Bind a device: construct, then `init()`.  Any failure degrades to
/// `Unavailable` with the error text as reason.
fn bind<T>(kind: DeviceKind, enabled: bool, build: impl FnOnce() -> Arc<T>) -> Capability<T>
where
    T: ?Sized + Device,
{
    if !enabled {
        info!("Registry: {} disabled by configuration", kind);
        return Capability::Unavailable("disabled by configuration".into());
    }
    let device = build();
    match device.init() {
        Ok(()) => {
            info!("Registry: {} bound", kind);
            Capability::Available(device)
        }
        Err(e) => {
            warn!("Registry: {} unavailable: {}", kind, e);
            Capability::Unavailable(e.to_string())
        }
    }
}

/// Device name → bound implementation.
pub struct CapabilityTable {
    led: Capability<dyn Led>,
    segment: Capability<dyn Segment>,
    buzzer: Capability<dyn Buzzer>,
    cds: Capability<dyn LightSensor>,
    unloaded: AtomicBool,
}

impl CapabilityTable {
    /// Bind every device the configuration enables.  The buzzer is bound
    /// first so the display can use it for its countdown alarm.
    pub fn load(config: &SystemConfig, hal: Arc<dyn HalPort>, shutdown: &Shutdown) -> Self {
        let devices = &config.devices;
        let poll = config.cancel_poll();
        let join = config.join_timeout();

        let buzzer = bind(DeviceKind::Buzzer, devices.buzzer, || {
            let timing = BuzzerTiming {
                note: std::time::Duration::from_millis(config.melody_note_ms),
                join_timeout: join,
                cancel_poll: poll,
            };
            Arc::new(BuzzerDriver::new(Arc::clone(&hal), timing, shutdown.clone())) as Arc<dyn Buzzer>
        });

        let led = bind(DeviceKind::Led, devices.led, || {
            Arc::new(LedDriver::new(Arc::clone(&hal))) as Arc<dyn Led>
        });

        let segment = bind(DeviceKind::Segment, devices.segment, || {
            let timing = SegmentTiming {
                tick: std::time::Duration::from_millis(config.countdown_tick_ms),
                alarm: std::time::Duration::from_millis(config.alarm_duration_ms),
                join_timeout: join,
                cancel_poll: poll,
            };
            Arc::new(SegmentDriver::new(
                Arc::clone(&hal),
                buzzer.clone(),
                timing,
                shutdown.clone(),
            )) as Arc<dyn Segment>
        });

        let cds = bind(DeviceKind::Cds, devices.cds, || {
            let settings = CdsSettings {
                threshold: config.light_threshold,
                poll_interval: std::time::Duration::from_millis(config.auto_poll_interval_ms),
                join_timeout: join,
                cancel_poll: poll,
            };
            Arc::new(CdsDriver::new(Arc::clone(&hal), settings, shutdown.clone())) as Arc<dyn LightSensor>
        });

        let table = Self {
            led,
            segment,
            buzzer,
            cds,
            unloaded: AtomicBool::new(false),
        };
        info!("Registry: {}/{} devices available", table.available_count(), DeviceKind::ALL.len());
        table
    }

    /// Resolve a registry key (`"led"`, `"segment"`, ...).
    pub fn kind_by_name(name: &str) -> Option<DeviceKind> {
        DeviceKind::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
    }

    fn get<'a, T: ?Sized>(&self, cap: &'a Capability<T>, kind: DeviceKind) -> Result<&'a Arc<T>> {
        if self.unloaded.load(Ordering::Acquire) {
            return Err(DeviceError::CapabilityUnavailable(kind));
        }
        cap.as_device().ok_or(DeviceError::CapabilityUnavailable(kind))
    }

    pub fn led(&self) -> Result<&Arc<dyn Led>> {
        self.get(&self.led, DeviceKind::Led)
    }

    pub fn segment(&self) -> Result<&Arc<dyn Segment>> {
        self.get(&self.segment, DeviceKind::Segment)
    }

    pub fn buzzer(&self) -> Result<&Arc<dyn Buzzer>> {
        self.get(&self.buzzer, DeviceKind::Buzzer)
    }

    pub fn cds(&self) -> Result<&Arc<dyn LightSensor>> {
        self.get(&self.cds, DeviceKind::Cds)
    }

    /// Lifecycle view of a bound device, by kind.
    pub fn device(&self, kind: DeviceKind) -> Result<&dyn Device> {
        Ok(match kind {
            DeviceKind::Led => &**self.led()? as &dyn Device,
            DeviceKind::Segment => &**self.segment()? as &dyn Device,
            DeviceKind::Buzzer => &**self.buzzer()? as &dyn Device,
            DeviceKind::Cds => &**self.cds()? as &dyn Device,
        })
    }

    pub fn is_available(&self, kind: DeviceKind) -> bool {
        self.device(kind).is_ok()
    }

    pub fn available_count(&self) -> usize {
        DeviceKind::ALL.into_iter().filter(|k| self.is_available(*k)).count()
    }

    /// Status line per device, unavailable ones included.
    pub fn status_lines(&self) -> Vec<String> {
        DeviceKind::ALL
            .into_iter()
            .map(|kind| match self.device(kind) {
                Ok(dev) => dev.status(),
                Err(_) => format!("{}: UNAVAILABLE", kind.tag()),
            })
            .collect()
    }

    /// Clean up every bound device.  Idempotent; lookups fail afterwards.
    /// The display goes first so a running countdown cannot start an
    /// alarm on a buzzer that is already cleaned up.
    pub fn unload(&self) {
        let order = [DeviceKind::Segment, DeviceKind::Cds, DeviceKind::Buzzer, DeviceKind::Led];
        let devices: Vec<&dyn Device> = order.into_iter().filter_map(|k| self.device(k).ok()).collect();
        if self.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }
        for dev in devices {
            dev.cleanup();
            info!("Registry: {} unloaded", dev.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_hal::SimHal;
    use crate::app::ports::Phase;

    #[test]
    fn all_devices_bind_on_sim() {
        let hal = Arc::new(SimHal::new());
        let table = CapabilityTable::load(&SystemConfig::default(), hal, &Shutdown::new());
        assert_eq!(table.available_count(), 4);
    }

    #[test]
    fn setup_failure_is_isolated() {
        let hal = Arc::new(SimHal::new());
        hal.fail_setup(DeviceKind::Buzzer);
        let table = CapabilityTable::load(&SystemConfig::default(), hal, &Shutdown::new());
        assert_eq!(table.available_count(), 3);
        assert!(matches!(
            table.buzzer(),
            Err(DeviceError::CapabilityUnavailable(DeviceKind::Buzzer))
        ));
        assert!(table.segment().is_ok());
    }

    #[test]
    fn disabled_devices_are_unavailable() {
        let mut config = SystemConfig::default();
        config.devices.led = false;
        config.devices.cds = false;
        let table = CapabilityTable::load(&config, Arc::new(SimHal::new()), &Shutdown::new());
        assert_eq!(table.available_count(), 2);
        assert_eq!(table.status_lines()[0], "LED: UNAVAILABLE");
    }

    #[test]
    fn unload_cleans_up_and_blocks_lookups() {
        let table = CapabilityTable::load(&SystemConfig::default(), Arc::new(SimHal::new()), &Shutdown::new());
        let led = Arc::clone(table.led().unwrap());
        table.unload();
        table.unload();
        assert_eq!(led.phase(), Phase::Uninitialized);
        assert!(table.led().is_err());
        assert_eq!(table.available_count(), 0);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(CapabilityTable::kind_by_name("cds"), Some(DeviceKind::Cds));
        assert_eq!(CapabilityTable::kind_by_name("fnd"), None);
    }
}
