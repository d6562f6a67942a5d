//! Registry of strategy contexts plus the collaborators they share.
//!
//! Contexts never see each other; the registry only routes collaborators and
//! fans events out to subscribers.

use std::collections::BTreeMap;

use tracing::error;

use super::context::{ContextReport, CycleReport, StrategyContext};
use super::ContextKey;
use crate::data::MarketDataProvider;
use crate::error::CoreError;
use crate::events::EventSink;
use crate::execution::OrderGateway;
use crate::notify::NotificationSink;

pub struct StrategyRegistry<M, G, N> {
    contexts: BTreeMap<ContextKey, StrategyContext>,
    market: M,
    gateway: G,
    notifier: N,
    sinks: Vec<Box<dyn EventSink>>,
}

impl<M, G, N> StrategyRegistry<M, G, N>
where
    M: MarketDataProvider,
    G: OrderGateway,
    N: NotificationSink,
{
    pub fn new(market: M, gateway: G, notifier: N) -> Self {
        Self {
            contexts: BTreeMap::new(),
            market,
            gateway,
            notifier,
            sinks: Vec::new(),
        }
    }

    pub fn register(&mut self, context: StrategyContext) -> Result<(), CoreError> {
        let key = context.key().clone();
        if self.contexts.contains_key(&key) {
            return Err(CoreError::DuplicateContext(key));
        }
        self.contexts.insert(key, context);
        Ok(())
    }

    pub fn remove(&mut self, key: &ContextKey) -> Option<StrategyContext> {
        self.contexts.remove(key)
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.contexts.keys()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn context(&self, key: &ContextKey) -> Option<&StrategyContext> {
        self.contexts.get(key)
    }

    pub fn context_mut(&mut self, key: &ContextKey) -> Option<&mut StrategyContext> {
        self.contexts.get_mut(key)
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    pub fn market_mut(&mut self) -> &mut M {
        &mut self.market
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Run one cycle of `key` and publish its events.
    pub fn update(&mut self, key: &ContextKey) -> Result<CycleReport, CoreError> {
        let context = self
            .contexts
            .get_mut(key)
            .ok_or_else(|| CoreError::UnknownContext(key.clone()))?;
        let report = context.update(&self.market, &mut self.gateway, &self.notifier)?;
        for event in &report.events {
            for sink in &mut self.sinks {
                sink.on_event(key, event);
            }
        }
        Ok(report)
    }

    /// Run one cycle of every context in key order. A failing context is
    /// logged and does not stop the others.
    pub fn update_all(&mut self) -> Vec<(ContextKey, Result<CycleReport, CoreError>)> {
        let keys: Vec<ContextKey> = self.contexts.keys().cloned().collect();
        keys.into_iter()
            .map(|key| {
                let result = self.update(&key);
                if let Err(err) = &result {
                    error!(context = %key, error = %err, "cycle failed");
                }
                (key, result)
            })
            .collect()
    }

    /// Reclassify against the live quote, then report.
    pub fn report(&mut self, key: &ContextKey) -> Result<ContextReport, CoreError> {
        let context = self
            .contexts
            .get_mut(key)
            .ok_or_else(|| CoreError::UnknownContext(key.clone()))?;
        let quote = self.market.quote(&key.symbol)?;
        context.reclassify(quote.mid());
        Ok(context.report())
    }
}
