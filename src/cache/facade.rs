//! The client façade over one named cache.
//!
//! Every operation resolves the key's partition owner at call time and
//! retries transparently on `WrongNode`, so callers never observe routing
//! staleness during a rebalance. Mutations hold the service quiescence gate
//! shared for their duration; a snapshot cut or suspension therefore sees no
//! half-applied operation. Same-key operations complete in submission order
//! because they serialize on the partition mutex.

use crate::cache::context::CacheContext;
use crate::cluster::coordinator::PartitionCoordinator;
use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::events::types::{
    EventInterceptor, ListenerScope, MapListener, RegistrationId,
};
use crate::index::extractor::ValueExtractor;
use crate::processor::aggregator::Aggregator;
use crate::processor::types::{EntryProcessor, InvocationResults};
use crate::query::filter::Filter;
use crate::query::planner::QueryPlanner;
use crate::security::{AccessReason, Principal};
use crate::storage::node::StorageNode;
use crate::types::{GridKey, GridValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

pub struct NamedCache<K, V> {
    context: Arc<CacheContext<K, V>>,
    coordinator: Arc<PartitionCoordinator<K, V>>,
    quiesce: Arc<RwLock<()>>,
    config: GridConfig,
    principal: Principal,
}

impl<K, V> Clone for NamedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            coordinator: self.coordinator.clone(),
            quiesce: self.quiesce.clone(),
            config: self.config.clone(),
            principal: self.principal.clone(),
        }
    }
}

impl<K: GridKey, V: GridValue> NamedCache<K, V> {
    pub(crate) fn new(
        context: Arc<CacheContext<K, V>>,
        coordinator: Arc<PartitionCoordinator<K, V>>,
        quiesce: Arc<RwLock<()>>,
        config: GridConfig,
        principal: Principal,
    ) -> Self {
        Self {
            context,
            coordinator,
            quiesce,
            config,
            principal,
        }
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub async fn get(&self, key: &K) -> GridResult<Option<V>> {
        let _gate = self.quiesce.read().await;
        route_and_retry(
            &self.coordinator,
            self.config.max_route_retries,
            key,
            |node, partition| node.get(&self.context, partition, key, &self.principal),
        )
        .await
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub async fn put(&self, key: K, value: V) -> GridResult<Option<V>> {
        let _gate = self.quiesce.read().await;
        route_and_retry(
            &self.coordinator,
            self.config.max_route_retries,
            &key,
            |node, partition| {
                let value = value.clone();
                node.mutate(
                    &self.context,
                    partition,
                    &key,
                    &self.principal,
                    AccessReason::Put,
                    move |entry| {
                        let previous = entry.value().cloned();
                        entry.set_value(value);
                        Ok(previous)
                    },
                )
            },
        )
        .await
    }

    /// Removes the entry for `key`, returning the removed value if any.
    pub async fn remove(&self, key: &K) -> GridResult<Option<V>> {
        let _gate = self.quiesce.read().await;
        route_and_retry(
            &self.coordinator,
            self.config.max_route_retries,
            key,
            |node, partition| {
                node.mutate(
                    &self.context,
                    partition,
                    key,
                    &self.principal,
                    AccessReason::Remove,
                    |entry| {
                        let previous = entry.value().cloned();
                        entry.remove();
                        Ok(previous)
                    },
                )
            },
        )
        .await
    }

    /// Total entry count across all partitions.
    pub async fn size(&self) -> GridResult<usize> {
        let _gate = self.quiesce.read().await;
        self.context
            .check_read_any(&self.principal, AccessReason::Query)?;
        let mut total = 0;
        self.coordinator
            .for_each_node(|node| total += node.cache_entry_count(&self.context.name));
        Ok(total)
    }

    /// Drops every entry of the cache. Bulk truncation: no per-entry events
    /// fire, indexes are emptied, and the cache store is not touched.
    pub async fn clear(&self) -> GridResult<()> {
        let _gate = self.quiesce.read().await;
        self.context
            .check_write_any(&self.principal, AccessReason::Remove)?;
        self.coordinator
            .for_each_node(|node| node.truncate_cache(&self.context.name));
        self.context.indexes.clear();
        tracing::info!(cache = %self.context.name, "cache truncated");
        Ok(())
    }

    /// Version of the stored entry for `key`, if present.
    pub async fn version(&self, key: &K) -> GridResult<Option<u64>> {
        let _gate = self.quiesce.read().await;
        route_and_retry(
            &self.coordinator,
            self.config.max_route_retries,
            key,
            |node, partition| {
                if !node.owns(partition) {
                    return Err(GridError::WrongNode {
                        partition,
                        node: node.id().clone(),
                    });
                }
                Ok(node.entry_version(&self.context.name, partition, key))
            },
        )
        .await
    }

    /// Runs an entry processor against one entry with exclusive access. The
    /// whole read-modify-write-notify sequence is atomic: a processor error
    /// surfaces as `ProcessorFailed` and leaves the entry untouched.
    pub async fn invoke<P>(&self, key: &K, processor: &P) -> GridResult<P::Output>
    where
        P: EntryProcessor<K, V>,
    {
        let _gate = self.quiesce.read().await;
        route_and_retry(
            &self.coordinator,
            self.config.max_route_retries,
            key,
            |node, partition| {
                node.mutate(
                    &self.context,
                    partition,
                    key,
                    &self.principal,
                    AccessReason::Invoke,
                    |entry| processor.process(entry),
                )
            },
        )
        .await
    }

    /// Runs a processor against every entry matching `filter`, one task per
    /// owning partition. Entries are processed independently: failures land
    /// in the per-key error map and never abort the other keys.
    pub async fn invoke_all<P>(
        &self,
        filter: &Filter<V>,
        processor: Arc<P>,
    ) -> GridResult<InvocationResults<K, P::Output>>
    where
        P: EntryProcessor<K, V>,
    {
        let _gate = self.quiesce.read().await;
        self.context
            .check_write_any(&self.principal, AccessReason::Invoke)?;
        let by_partition = self.matching_keys_by_partition(filter);

        let mut tasks: JoinSet<(HashMap<K, P::Output>, HashMap<K, GridError>)> = JoinSet::new();
        for (_, keys) in by_partition {
            let coordinator = self.coordinator.clone();
            let context = self.context.clone();
            let principal = self.principal.clone();
            let processor = processor.clone();
            let retries = self.config.max_route_retries;
            tasks.spawn(async move {
                let mut results = HashMap::new();
                let mut errors = HashMap::new();
                for key in keys {
                    let outcome = route_and_retry(
                        &coordinator,
                        retries,
                        &key,
                        |node, partition| {
                            node.mutate(
                                &context,
                                partition,
                                &key,
                                &principal,
                                AccessReason::Invoke,
                                |entry| processor.process(entry),
                            )
                        },
                    )
                    .await;
                    match outcome {
                        Ok(output) => {
                            results.insert(key, output);
                        }
                        Err(e) => {
                            errors.insert(key, e);
                        }
                    }
                }
                (results, errors)
            });
        }

        let mut combined = InvocationResults::new();
        while let Some(joined) = tasks.join_next().await {
            let (results, errors) = joined.map_err(|e| GridError::ProcessorFailed {
                reason: e.to_string(),
            })?;
            combined.results.extend(results);
            combined.errors.extend(errors);
        }
        Ok(combined)
    }

    /// Folds every entry matching `filter` through the aggregator: one
    /// partial per partition, combined and finished on the calling task.
    pub async fn aggregate<A>(&self, filter: &Filter<V>, aggregator: Arc<A>) -> GridResult<A::Output>
    where
        A: Aggregator<K, V>,
    {
        let _gate = self.quiesce.read().await;
        self.context
            .check_read_any(&self.principal, AccessReason::Aggregate)?;
        let entries = self.coordinator.cache_entries(&self.context.name);
        let matched = QueryPlanner::evaluate(filter, &self.context.indexes, &entries);

        let mut by_partition: HashMap<u32, Vec<(K, V)>> = HashMap::new();
        for key in matched {
            let partition = self.coordinator.route(&key);
            if let Some(value) = entries.get(&key) {
                by_partition
                    .entry(partition)
                    .or_default()
                    .push((key, value.clone()));
            }
        }

        let mut tasks: JoinSet<A::Partial> = JoinSet::new();
        for (_, chunk) in by_partition {
            let aggregator = aggregator.clone();
            tasks.spawn(async move {
                let mut partial = aggregator.initial();
                for (key, value) in &chunk {
                    aggregator.accumulate(&mut partial, key, value);
                }
                partial
            });
        }

        let mut combined = aggregator.initial();
        while let Some(joined) = tasks.join_next().await {
            let partial = joined.map_err(|e| GridError::ProcessorFailed {
                reason: e.to_string(),
            })?;
            combined = aggregator.combine(combined, partial);
        }
        Ok(aggregator.finish(combined))
    }

    /// Key/value pairs of every entry matching `filter`.
    pub async fn entry_set(&self, filter: &Filter<V>) -> GridResult<Vec<(K, V)>> {
        let _gate = self.quiesce.read().await;
        self.context
            .check_read_any(&self.principal, AccessReason::Query)?;
        let entries = self.coordinator.cache_entries(&self.context.name);
        let matched = QueryPlanner::evaluate(filter, &self.context.indexes, &entries);
        let mut result = Vec::with_capacity(matched.len());
        for key in matched {
            if let Some(value) = entries.get(&key) {
                result.push((key, value.clone()));
            }
        }
        Ok(result)
    }

    /// Keys of every entry matching `filter`.
    pub async fn keys(&self, filter: &Filter<V>) -> GridResult<Vec<K>> {
        let _gate = self.quiesce.read().await;
        self.context
            .check_read_any(&self.principal, AccessReason::Query)?;
        let entries = self.coordinator.cache_entries(&self.context.name);
        Ok(QueryPlanner::evaluate(filter, &self.context.indexes, &entries)
            .into_iter()
            .collect())
    }

    /// Builds a secondary index over the current contents and keeps it
    /// maintained by subsequent mutations. Built under the exclusive
    /// quiescence gate so no concurrent mutation is missed by the build.
    pub async fn add_index(
        &self,
        extractor: Arc<dyn ValueExtractor<V>>,
        ordered: bool,
    ) -> GridResult<()> {
        let _gate = self.quiesce.write().await;
        let entries = self.coordinator.cache_entries(&self.context.name);
        self.context.indexes.add_index(extractor, ordered, &entries);
        Ok(())
    }

    /// Discards the index registered under `extractor_id`.
    pub async fn remove_index(&self, extractor_id: &str) -> bool {
        let _gate = self.quiesce.write().await;
        self.context.indexes.remove_index(extractor_id)
    }

    pub fn add_listener(
        &self,
        listener: Arc<dyn MapListener<K, V>>,
        scope: ListenerScope<K, V>,
    ) -> RegistrationId {
        self.context.events.add_listener(listener, scope)
    }

    pub fn remove_listener(&self, id: &RegistrationId) -> bool {
        self.context.events.remove_listener(id)
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn EventInterceptor<K, V>>) -> RegistrationId {
        self.context.events.add_interceptor(interceptor)
    }

    pub fn remove_interceptor(&self, id: &RegistrationId) -> bool {
        self.context.events.remove_interceptor(id)
    }

    fn matching_keys_by_partition(&self, filter: &Filter<V>) -> HashMap<u32, Vec<K>> {
        let entries = self.coordinator.cache_entries(&self.context.name);
        let matched = QueryPlanner::evaluate(filter, &self.context.indexes, &entries);
        let mut by_partition: HashMap<u32, Vec<K>> = HashMap::new();
        for key in matched {
            let partition = self.coordinator.route(&key);
            by_partition.entry(partition).or_default().push(key);
        }
        by_partition
    }
}

/// Resolves the key's current partition owner and runs `op` against it,
/// retrying on `WrongNode` up to `max_retries` times. Retries yield to the
/// scheduler so an in-flight transfer can finish flipping ownership.
async fn route_and_retry<K, V, T>(
    coordinator: &Arc<PartitionCoordinator<K, V>>,
    max_retries: usize,
    key: &K,
    mut op: impl FnMut(&StorageNode<K, V>, u32) -> GridResult<T>,
) -> GridResult<T>
where
    K: GridKey,
    V: GridValue,
{
    let partition = coordinator.route(key);
    let mut attempt = 0;
    loop {
        let node = coordinator.owner_of(partition);
        match op(&node, partition) {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                tracing::debug!(partition, attempt, "stale route; refreshing owner and retrying");
                attempt += 1;
                tokio::task::yield_now().await;
            }
            other => return other,
        }
    }
}
