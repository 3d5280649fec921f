use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct DeviceMetrics {
    pub devices_created: IntCounter,
    pub messages_built: IntCounter,
    pub messages_dispatched: IntCounter,
    pub dispatch_rejected: IntCounter,
}

fn register(registry: &Registry, counter: &IntCounter) -> Result<(), String> {
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| format!("metrics register error: {e}"))
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: DeviceMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let dev = DeviceMetrics {
            devices_created: counter("dm_devices_created", "Devices built from a schema")?,
            messages_built: counter("dm_messages_built", "Outbound envelopes produced")?,
            messages_dispatched: counter(
                "dm_messages_dispatched",
                "Inbound messages applied to a device",
            )?,
            dispatch_rejected: counter(
                "dm_dispatch_rejected",
                "Inbound messages rejected before any value was applied",
            )?,
        };
        let registry = Registry::new();
        register(&registry, &dev.devices_created)?;
        register(&registry, &dev.messages_built)?;
        register(&registry, &dev.messages_dispatched)?;
        register(&registry, &dev.dispatch_rejected)?;
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_counters() {
        let hub = MetricsHub::new().unwrap();
        hub.dev.messages_built.inc();
        let text = hub.encode_text();
        assert!(text.contains("dm_messages_built 1"));
        assert!(text.contains("dm_dispatch_rejected 0"));
    }

    #[test]
    fn registration_errors_are_reported() {
        let hub = MetricsHub::new().unwrap();
        let err = register(&hub.registry, &hub.dev.messages_built).unwrap_err();
        assert!(err.starts_with("metrics register error"));
    }
}
