use crate::events::sinks::{LoggingSink, WebhookSink};
use crate::events::{Event, EventSink, EventSinkKind};
use crate::utils::error::{NodewatcherError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type SinkFactory = fn(&toml::Table) -> Result<Arc<dyn EventSink>>;

fn build<S: EventSinkKind>(config: &toml::Table) -> Result<Arc<dyn EventSink>> {
    Ok(Arc::new(S::from_config(config)?))
}

/// Sink kinds that discovery may enable.
fn builtin_kinds() -> [(&'static str, SinkFactory); 2] {
    [
        (LoggingSink::NAME, build::<LoggingSink> as SinkFactory),
        (WebhookSink::NAME, build::<WebhookSink> as SinkFactory),
    ]
}

pub struct EventSinkPool {
    configs: HashMap<String, toml::Table>,
    sinks: RwLock<BTreeMap<String, Arc<dyn EventSink>>>,
    discovered: AtomicBool,
}

impl EventSinkPool {
    /// Creates a pool; `configs` maps sink names to their configuration tables.
    pub fn new(configs: HashMap<String, toml::Table>) -> Self {
        Self {
            configs,
            sinks: RwLock::new(BTreeMap::new()),
            discovered: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn EventSink>>> {
        self.sinks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn EventSink>>> {
        self.sinks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('.') || name.contains('/') {
            return Err(NodewatcherError::InvalidEventSink {
                message: format!("An event sink '{}' has invalid name", name),
            });
        }

        if self.read().contains_key(name) {
            return Err(NodewatcherError::EventSinkAlreadyRegistered {
                name: name.to_string(),
            });
        }

        Ok(())
    }

    fn register_factory(&self, name: &str, factory: SinkFactory) -> Result<()> {
        self.check_name(name)?;

        let empty = toml::Table::new();
        let config = self.configs.get(name).unwrap_or(&empty);
        let sink = factory(config)?;
        self.write().insert(name.to_string(), sink);
        tracing::debug!("Registered event sink '{}'", name);
        Ok(())
    }

    /// Registers a sink kind, configured from the table with the same name.
    pub fn register<S: EventSinkKind>(&self) -> Result<()> {
        self.register_factory(S::NAME, build::<S>)
    }

    /// Registers an already constructed sink under its own name.
    pub fn register_instance(&self, sink: Arc<dyn EventSink>) -> Result<()> {
        let name = sink.name().to_string();
        self.check_name(&name)?;
        self.write().insert(name, sink);
        Ok(())
    }

    pub fn unregister<S: EventSinkKind>(&self) -> Result<()> {
        self.unregister_by_name(S::NAME)
    }

    pub fn unregister_by_name(&self, name: &str) -> Result<()> {
        match self.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(NodewatcherError::EventSinkNotRegistered {
                name: name.to_string(),
            }),
        }
    }

    /// Enables every built-in sink that has a configuration table. Runs once.
    pub fn discover_sinks(&self) -> Result<()> {
        if self.discovered.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for (name, factory) in builtin_kinds() {
            if !self.configs.contains_key(name) || self.read().contains_key(name) {
                continue;
            }
            self.register_factory(name, factory)?;
        }

        for name in self.configs.keys() {
            if !self.read().contains_key(name) {
                tracing::warn!("Configuration for unknown event sink '{}' ignored", name);
            }
        }

        Ok(())
    }

    pub fn all_sinks(&self) -> Result<Vec<Arc<dyn EventSink>>> {
        self.discover_sinks()?;
        Ok(self.read().values().cloned().collect())
    }

    pub fn sink(&self, name: &str) -> Result<Arc<dyn EventSink>> {
        self.discover_sinks()?;
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| NodewatcherError::EventSinkNotRegistered {
                name: name.to_string(),
            })
    }

    /// Delivers the event to every sink and returns how many accepted it.
    pub async fn dispatch(&self, event: &Event) -> usize {
        let sinks = match self.all_sinks() {
            Ok(sinks) => sinks,
            Err(e) => {
                tracing::error!("❌ Event sink discovery failed: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for sink in sinks {
            match sink.deliver(event).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    "Event sink '{}' failed to deliver {}.{}: {}",
                    sink.name(),
                    event.source,
                    event.kind,
                    e
                ),
            }
        }
        delivered
    }
}

impl Default for EventSinkPool {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
