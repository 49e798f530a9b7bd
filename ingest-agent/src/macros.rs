/// Logs through the `log` facade under a `greengrid::<component>` target, so
/// the fern formatter renders the component in place of the module path.
/// Usage:
/// ```rust,ignore
/// greengrid_log!(log::Level::Info, "bus", "Subscribed to {}", topic);
/// greengrid_log!(log::Level::Error, "config", "Config load failed: {}", err);
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][INFO ][greengrid::bus][pid=4568][tid=ThreadId(1)] Subscribed to greengrid/oficinas/data
#[macro_export]
macro_rules! greengrid_log {
    ($level:expr, $component:literal, $fmt:literal $(, $($arg:tt)+)?) => {
        log::log!(
            target: concat!("greengrid::", $component),
            $level,
            $fmt
            $(, $($arg)+)?
        )
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        buffer: Mutex<String>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { buffer: Mutex::new(String::new()) }
        }

        fn take(&self) -> String {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) && record.target().starts_with("greengrid::") {
                let mut buf = self.buffer.lock().unwrap();
                buf.push_str(&format!("[{}][{}] {}\n", record.level(), record.target(), record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn greengrid_log_tags_component_target() {
        // install our in-memory logger
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Debug);

        // clear any existing
        LOGGER.take();

        greengrid_log!(Level::Debug, "retention", "evicted={}!", 42);
        greengrid_log!(Level::Trace, "retention", "below the max level");

        let output = LOGGER.take();
        assert!(output.contains("[DEBUG][greengrid::retention]"), "missing level/component: {}", output);
        assert!(output.contains("evicted=42!"), "missing payload: {}", output);
        assert!(!output.contains("below the max level"), "trace should be filtered: {}", output);
    }
}
