//! Trigger and action capabilities the scheduler can dispatch to.
//!
//! Automates reference entries by position, so the registry is an ordered
//! list built once at startup; appending is the only safe way to extend it.

use crate::db::models::{ServiceTokenMap, User};
use crate::error::AppError;
use crate::spotify::SpotifyIntegration;
use crate::spotify::automations::{NotPlaying, Playing, QueueTrack, ResumePlayback};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// A condition evaluated for one user on every tick
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn check(
        &self,
        option: &str,
        tokens: &ServiceTokenMap,
        user: &User,
    ) -> Result<bool, AppError>;
}

/// Work done when the paired trigger fires; the returned message is logged
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn run(
        &self,
        option: &str,
        tokens: &ServiceTokenMap,
        user: &User,
    ) -> Result<String, AppError>;
}

#[derive(Clone, Default)]
pub struct Registry {
    triggers: Vec<Arc<dyn Trigger>>,
    actions: Vec<Arc<dyn Action>>,
}

/// One registry entry as exposed by `GET /registry`
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub index: usize,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryListing {
    pub triggers: Vec<Capability>,
    pub actions: Vec<Capability>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in capabilities, in their stable index order
    pub fn builtin(spotify: Arc<SpotifyIntegration>) -> Self {
        Self::new()
            .with_trigger(NotPlaying::new(spotify.clone()))
            .with_trigger(Playing::new(spotify.clone()))
            .with_action(ResumePlayback::new(spotify.clone()))
            .with_action(QueueTrack::new(spotify))
    }

    pub fn with_trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.triggers.push(Arc::new(trigger));
        self
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// `None` for negative or out-of-range indices
    pub fn trigger(&self, index: i32) -> Option<&Arc<dyn Trigger>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.triggers.get(i))
    }

    pub fn action(&self, index: i32) -> Option<&Arc<dyn Action>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.actions.get(i))
    }

    pub fn listing(&self) -> RegistryListing {
        RegistryListing {
            triggers: self
                .triggers
                .iter()
                .enumerate()
                .map(|(index, t)| Capability {
                    index,
                    name: t.name(),
                    description: t.description(),
                })
                .collect(),
            actions: self
                .actions
                .iter()
                .enumerate()
                .map(|(index, a)| Capability {
                    index,
                    name: a.name(),
                    description: a.description(),
                })
                .collect(),
        }
    }
}
