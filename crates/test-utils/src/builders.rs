#![allow(dead_code)]

use std::collections::BTreeMap;

use workbridge::config::model::{ExecutorSection, RawBridgeSection, RawSchedulerSection};
use workbridge::config::{ConfigFile, RawConfigFile};
use workbridge::presentation::NotificationTemplate;
use workbridge::registry::{RawWorkerDefinition, WorkerDefinition};

/// Builder for `RawWorkerDefinition`.
pub struct WorkerDefinitionBuilder {
    worker: RawWorkerDefinition,
}

impl WorkerDefinitionBuilder {
    pub fn new(name: &str, mode: &str) -> Self {
        Self {
            worker: RawWorkerDefinition {
                name: Some(name.to_string()),
                mode: Some(mode.to_string()),
                ..RawWorkerDefinition::default()
            },
        }
    }

    pub fn queued(name: &str) -> Self {
        Self::new(name, "queued")
    }

    pub fn one_time(name: &str) -> Self {
        Self::new(name, "oneTime")
    }

    pub fn periodic(name: &str) -> Self {
        Self::new(name, "periodic")
    }

    pub fn network(mut self, network: &str) -> Self {
        self.worker.constraints.network = Some(network.to_string());
        self
    }

    pub fn battery(mut self, battery: &str) -> Self {
        self.worker.constraints.battery = Some(battery.to_string());
        self
    }

    pub fn idle(mut self, idle: bool) -> Self {
        self.worker.constraints.idle = idle;
        self
    }

    pub fn repeat_interval(mut self, interval: &str) -> Self {
        self.worker.repeat_interval = Some(interval.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.worker.timeout = Some(timeout.to_string());
        self
    }

    pub fn foreground_behaviour(mut self, behaviour: &str) -> Self {
        self.worker.foreground_behaviour = Some(behaviour.to_string());
        self
    }

    pub fn notification(mut self, title: &str, text: &str) -> Self {
        self.worker.notification = Some(NotificationTemplate {
            title: title.to_string(),
            text: text.to_string(),
            actions: vec![],
        });
        self
    }

    pub fn build(self) -> RawWorkerDefinition {
        self.worker
    }

    pub fn validated(self) -> WorkerDefinition {
        WorkerDefinition::try_from(self.worker).expect("Failed to build valid worker definition")
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                bridge: RawBridgeSection::default(),
                scheduler: RawSchedulerSection::default(),
                executor: None,
                worker: BTreeMap::new(),
            },
        }
    }

    pub fn with_worker(mut self, name: &str, mut worker: RawWorkerDefinition) -> Self {
        worker.name = None;
        self.config.worker.insert(name.to_string(), worker);
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.bridge.default_timeout = Some(timeout.to_string());
        self
    }

    pub fn with_backoff(mut self, kind: &str, delay: &str) -> Self {
        self.config.scheduler.backoff = Some(kind.to_string());
        self.config.scheduler.backoff_delay = Some(delay.to_string());
        self
    }

    pub fn with_executor(mut self, cmd: &str) -> Self {
        self.config.executor = Some(ExecutorSection {
            cmd: cmd.to_string(),
            channel_capacity: 8,
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
