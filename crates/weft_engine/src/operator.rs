//! Per-node evaluation with reuse and early cutoff.
//!
//! Every node kind implements [`Operator`]. An operator sees the outputs of
//! its inputs for the current pass, each item flagged as changed or not, and
//! the committed cache from the last successful pass. It returns its own
//! items plus the cache entries to stage into the pass overlay.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use rayon::prelude::*;
use weft_common::{ContentHash, Fingerprint};
use weft_diagnostics::Diagnostic;

use crate::cache::{CacheEntry, NodeCache};
use crate::cancel::CancellationToken;
use crate::error::{PassError, TransformError, TRANSFORM_FAILED};
use crate::input::InputSnapshot;
use crate::output::{Artifact, EmitError, OutputContext, OutputSink};
use crate::pipeline::Group;
use crate::value::{downcast, Item, ItemKey, NodeId, Value};

pub(crate) type MapFn<T, U> = Box<dyn Fn(&T) -> Result<U, TransformError> + Send + Sync>;
pub(crate) type PredicateFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
pub(crate) type ExtractFn<T> = Box<dyn Fn(&InputSnapshot) -> Vec<(ItemKey, T)> + Send + Sync>;
pub(crate) type ActionFn<T> =
    Box<dyn Fn(&mut OutputContext<'_>, &T) -> Result<(), EmitError> + Send + Sync>;

/// The items a node produced in the current pass.
#[derive(Default)]
pub(crate) struct NodeOutput {
    pub items: Vec<Item>,
}

#[derive(Default)]
pub(crate) struct NodeResult {
    pub output: NodeOutput,
    pub entries: Vec<(ItemKey, CacheEntry)>,
    pub diagnostics: Vec<Diagnostic>,
    pub reused: usize,
    pub recomputed: usize,
}

impl NodeResult {
    fn push(&mut self, item: Item) {
        self.entries.push((
            item.key,
            CacheEntry::value(item.fingerprint, Arc::clone(&item.value)),
        ));
        self.output.items.push(item);
    }

    fn push_reused(&mut self, key: ItemKey, entry: &CacheEntry) {
        self.reused += 1;
        self.push(Item {
            key,
            value: Arc::clone(&entry.value),
            fingerprint: entry.fingerprint,
            changed: false,
        });
    }
}

pub(crate) struct EvalContext<'a> {
    pub node: NodeId,
    pub label: &'a str,
    pub snapshot: &'a InputSnapshot,
    pub inputs: Vec<&'a NodeOutput>,
    pub previous: &'a NodeCache,
    pub sink: &'a OutputSink,
    pub cancel: &'a CancellationToken,
    pub parallel: bool,
    pub verify_reuse: bool,
}

impl EvalContext<'_> {
    fn input(&self, index: usize) -> Result<&NodeOutput, PassError> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| PassError::InvariantViolation {
                node: self.node,
                message: format!("missing input {index}"),
            })
    }

    fn previous(&self, key: ItemKey) -> Option<&CacheEntry> {
        self.previous.get(self.node, key)
    }

    fn failure(&self, key: ItemKey, err: &TransformError) -> Diagnostic {
        let diag = Diagnostic::error(
            TRANSFORM_FAILED,
            "Transform",
            format!("{} failed: {}", self.label, err.message),
        )
        .with_note(format!("node {}, item {}", self.node, key));
        match &err.location {
            Some(location) => diag.with_location(location.clone()),
            None => diag,
        }
    }

    /// Maps items in order, on the rayon pool when the pass is parallel.
    fn map_items<R, F>(&self, items: &[Item], f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&Item) -> R + Send + Sync,
    {
        if self.parallel && items.len() > 1 {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }
}

pub(crate) trait Operator: Send + Sync {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError>;
}

/// Fingerprint of a set of items, independent of their order.
fn set_fingerprint<'a>(items: impl IntoIterator<Item = &'a Item>) -> Fingerprint {
    ContentHash::combine_unordered(
        items
            .into_iter()
            .map(|item| ContentHash::combine([&item.key.digest(), &item.fingerprint])),
    )
}

/// The items of a set-valued node in ascending key order. Materialising in
/// this order makes the value depend only on the set, so a reordered but
/// otherwise equal input can reuse it.
fn canonical<'a>(items: impl IntoIterator<Item = &'a Item>) -> Vec<&'a Item> {
    let mut items: Vec<&Item> = items.into_iter().collect();
    items.sort_by_key(|item| item.key);
    items
}

pub(crate) struct SourceOp<T> {
    extract: ExtractFn<T>,
}

impl<T: Value> SourceOp<T> {
    pub(crate) fn new(extract: ExtractFn<T>) -> Self {
        Self { extract }
    }
}

impl<T: Value> Operator for SourceOp<T> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let mut result = NodeResult::default();
        for (key, value) in (self.extract)(cx.snapshot) {
            let fingerprint = ContentHash::of(&value);
            match cx.previous(key) {
                Some(entry) if entry.fingerprint == fingerprint => result.push_reused(key, entry),
                _ => {
                    result.recomputed += 1;
                    result.push(Item {
                        key,
                        value: Arc::new(value),
                        fingerprint,
                        changed: true,
                    });
                }
            }
        }
        Ok(result)
    }
}

enum MapStep {
    Reused(Item),
    Computed(Item),
    Failed(Diagnostic),
}

pub(crate) struct MapOp<T, U> {
    f: MapFn<T, U>,
}

impl<T: Value, U: Value> MapOp<T, U> {
    pub(crate) fn new(f: MapFn<T, U>) -> Self {
        Self { f }
    }

    fn step(&self, cx: &EvalContext<'_>, item: &Item) -> Result<MapStep, PassError> {
        let previous = cx.previous(item.key);
        if let (false, Some(entry)) = (item.changed, previous) {
            if cx.verify_reuse {
                self.verify(cx, item, entry)?;
            }
            return Ok(MapStep::Reused(Item {
                key: item.key,
                value: Arc::clone(&entry.value),
                fingerprint: entry.fingerprint,
                changed: false,
            }));
        }

        let input = downcast::<T>(&item.value, cx.node)?;
        let output = match (self.f)(input) {
            Ok(output) => output,
            Err(err) => return Ok(MapStep::Failed(cx.failure(item.key, &err))),
        };
        let fingerprint = ContentHash::of(&output);
        if let Some(entry) = previous {
            // Early cutoff: an equal result keeps the cached value and stops
            // invalidation here.
            if entry.fingerprint == fingerprint && *downcast::<U>(&entry.value, cx.node)? == output {
                return Ok(MapStep::Computed(Item {
                    key: item.key,
                    value: Arc::clone(&entry.value),
                    fingerprint,
                    changed: false,
                }));
            }
        }
        Ok(MapStep::Computed(Item {
            key: item.key,
            value: Arc::new(output),
            fingerprint,
            changed: true,
        }))
    }

    fn verify(&self, cx: &EvalContext<'_>, item: &Item, entry: &CacheEntry) -> Result<(), PassError> {
        let input = downcast::<T>(&item.value, cx.node)?;
        let recomputed = (self.f)(input).map(|output| ContentHash::of(&output));
        match recomputed {
            Ok(fingerprint) if fingerprint == entry.fingerprint => Ok(()),
            _ => Err(PassError::InvariantViolation {
                node: cx.node,
                message: format!(
                    "item {} recomputed to a different result from unchanged input; `{}` is not pure",
                    item.key, cx.label
                ),
            }),
        }
    }
}

impl<T: Value, U: Value> Operator for MapOp<T, U> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let upstream = cx.input(0)?;
        let steps = cx.map_items(&upstream.items, |item| self.step(cx, item));

        let mut result = NodeResult::default();
        for step in steps {
            match step? {
                MapStep::Reused(item) => {
                    result.reused += 1;
                    result.push(item);
                }
                MapStep::Computed(item) => {
                    result.recomputed += 1;
                    result.push(item);
                }
                MapStep::Failed(diag) => {
                    result.recomputed += 1;
                    result.diagnostics.push(diag);
                }
            }
        }
        Ok(result)
    }
}

pub(crate) struct FilterOp<T> {
    predicate: PredicateFn<T>,
}

impl<T: Value> FilterOp<T> {
    pub(crate) fn new(predicate: PredicateFn<T>) -> Self {
        Self { predicate }
    }

    /// Returns the kept item, if any, and whether the predicate was skipped.
    fn step(&self, cx: &EvalContext<'_>, item: &Item) -> Result<(Option<Item>, bool), PassError> {
        let previous = cx.previous(item.key);
        if !item.changed {
            // The upstream item is the one the last pass saw, so its
            // membership is whatever that pass decided.
            let kept = previous.map(|entry| Item {
                key: item.key,
                value: Arc::clone(&entry.value),
                fingerprint: entry.fingerprint,
                changed: false,
            });
            return Ok((kept, true));
        }

        let keep = (self.predicate)(downcast::<T>(&item.value, cx.node)?);
        let kept = keep.then(|| Item {
            key: item.key,
            value: Arc::clone(&item.value),
            fingerprint: item.fingerprint,
            changed: previous.map_or(true, |entry| entry.fingerprint != item.fingerprint),
        });
        Ok((kept, false))
    }
}

impl<T: Value> Operator for FilterOp<T> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let upstream = cx.input(0)?;
        let steps = cx.map_items(&upstream.items, |item| self.step(cx, item));

        let mut result = NodeResult::default();
        for step in steps {
            let (kept, skipped) = step?;
            if skipped {
                result.reused += 1;
            } else {
                result.recomputed += 1;
            }
            if let Some(item) = kept {
                result.push(item);
            }
        }
        Ok(result)
    }
}

pub(crate) struct CollectOp<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Value> CollectOp<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: Value> Operator for CollectOp<T> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let upstream = cx.input(0)?;
        let fingerprint = set_fingerprint(&upstream.items);

        let mut result = NodeResult::default();
        match cx.previous(ItemKey::UNIT) {
            Some(entry) if entry.fingerprint == fingerprint => {
                result.push_reused(ItemKey::UNIT, entry);
            }
            _ => {
                let values = canonical(&upstream.items)
                    .into_iter()
                    .map(|item| downcast::<T>(&item.value, cx.node).cloned())
                    .collect::<Result<Vec<T>, _>>()?;
                result.recomputed += 1;
                result.push(Item {
                    key: ItemKey::UNIT,
                    value: Arc::new(values),
                    fingerprint,
                    changed: true,
                });
            }
        }
        Ok(result)
    }
}

/// The second half of `group_by`: partitions `(K, T)` pairs into groups.
pub(crate) struct PartitionOp<K, T> {
    _marker: PhantomData<fn() -> (K, T)>,
}

impl<K: Value, T: Value> PartitionOp<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K: Value, T: Value> Operator for PartitionOp<K, T> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let upstream = cx.input(0)?;

        let mut groups: Vec<(ItemKey, &K, Vec<&Item>)> = Vec::new();
        let mut index: HashMap<ItemKey, usize> = HashMap::new();
        for item in &upstream.items {
            let (key, _) = downcast::<(K, T)>(&item.value, cx.node)?;
            let group_key = ItemKey::of(key);
            match index.get(&group_key) {
                Some(&at) => groups[at].2.push(item),
                None => {
                    index.insert(group_key, groups.len());
                    groups.push((group_key, key, vec![item]));
                }
            }
        }

        let mut result = NodeResult::default();
        for (group_key, key, members) in groups {
            let fingerprint = ContentHash::combine([
                &ContentHash::of(key),
                &set_fingerprint(members.iter().copied()),
            ]);
            match cx.previous(group_key) {
                Some(entry) if entry.fingerprint == fingerprint => {
                    result.push_reused(group_key, entry);
                }
                _ => {
                    let members = canonical(members.iter().copied())
                        .into_iter()
                        .map(|item| downcast::<(K, T)>(&item.value, cx.node).map(|(_, v)| v.clone()))
                        .collect::<Result<Vec<T>, _>>()?;
                    result.recomputed += 1;
                    result.push(Item {
                        key: group_key,
                        value: Arc::new(Group {
                            key: key.clone(),
                            members,
                        }),
                        fingerprint,
                        changed: true,
                    });
                }
            }
        }
        Ok(result)
    }
}

pub(crate) struct CombineOp<L, R> {
    _marker: PhantomData<fn() -> (L, R)>,
}

impl<L: Value, R: Value> CombineOp<L, R> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<L: Value, R: Value> Operator for CombineOp<L, R> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let left = cx.input(0)?;
        let right = cx.input(1)?;
        let mut result = NodeResult::default();
        // A single-valued input can still be empty when its only item failed.
        let Some(right_item) = right.items.first() else {
            return Ok(result);
        };
        let right_value = downcast::<R>(&right_item.value, cx.node)?;

        for item in &left.items {
            let fingerprint = ContentHash::combine([&item.fingerprint, &right_item.fingerprint]);
            match cx.previous(item.key) {
                Some(entry) if entry.fingerprint == fingerprint => result.push_reused(item.key, entry),
                _ => {
                    let left_value = downcast::<L>(&item.value, cx.node)?;
                    result.recomputed += 1;
                    result.push(Item {
                        key: item.key,
                        value: Arc::new((left_value.clone(), right_value.clone())),
                        fingerprint,
                        changed: true,
                    });
                }
            }
        }
        Ok(result)
    }
}

/// A terminal node. Runs the registered action per item, or replays what the
/// action emitted last time when the item is unchanged.
pub(crate) struct OutputOp<T> {
    action: ActionFn<T>,
}

impl<T: Value> OutputOp<T> {
    pub(crate) fn new(action: ActionFn<T>) -> Self {
        Self { action }
    }

    fn replay(cx: &EvalContext<'_>, entry: &CacheEntry, result: &mut NodeResult) -> Result<bool, PassError> {
        let Some(emissions) = &entry.emissions else {
            return Ok(false);
        };
        for (name, content) in &emissions.artifacts {
            cx.sink.add_artifact(Artifact {
                name: name.clone(),
                content: content.clone(),
                origin: cx.node,
            })?;
        }
        result.diagnostics.extend(emissions.diagnostics.iter().cloned());
        Ok(true)
    }
}

impl<T: Value> Operator for OutputOp<T> {
    fn evaluate(&self, cx: &EvalContext<'_>) -> Result<NodeResult, PassError> {
        let upstream = cx.input(0)?;
        let mut result = NodeResult::default();

        for item in &upstream.items {
            cx.cancel.check()?;

            if let (false, Some(entry)) = (item.changed, cx.previous(item.key)) {
                if Self::replay(cx, entry, &mut result)? {
                    result.reused += 1;
                    result.entries.push((item.key, entry.clone()));
                    continue;
                }
            }

            result.recomputed += 1;
            let value = downcast::<T>(&item.value, cx.node)?;
            let mut ctx = OutputContext::new(cx.sink, cx.node);
            let outcome = (self.action)(&mut ctx, value);
            if let Some(fatal) = cx.sink.fatal_error() {
                return Err(fatal.into());
            }
            match outcome {
                Ok(()) => {
                    let emissions = ctx.into_emissions();
                    result.diagnostics.extend(emissions.diagnostics.iter().cloned());
                    result.entries.push((
                        item.key,
                        CacheEntry::emitted(
                            item.fingerprint,
                            Arc::clone(&item.value),
                            Arc::new(emissions),
                        ),
                    ));
                }
                Err(EmitError::Sink(err)) => return Err(err.into()),
                Err(EmitError::Transform(err)) => {
                    result.diagnostics.extend(ctx.abandon());
                    result.diagnostics.push(cx.failure(item.key, &err));
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DiagnosticPolicy;

    struct Harness {
        snapshot: InputSnapshot,
        previous: NodeCache,
        sink: OutputSink,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                snapshot: InputSnapshot::empty(),
                previous: NodeCache::default(),
                sink: OutputSink::new(DiagnosticPolicy::default()),
                cancel: CancellationToken::new(),
            }
        }

        fn cx<'a>(&'a self, inputs: Vec<&'a NodeOutput>) -> EvalContext<'a> {
            EvalContext {
                node: NodeId::from_raw(1),
                label: "test",
                snapshot: &self.snapshot,
                inputs,
                previous: &self.previous,
                sink: &self.sink,
                cancel: &self.cancel,
                parallel: false,
                verify_reuse: false,
            }
        }

        /// Makes `result` the committed state of node #1.
        fn commit(&mut self, result: NodeResult) {
            let mut cache = NodeCache::default();
            cache.extend(NodeId::from_raw(1), result.entries);
            self.previous = cache;
        }
    }

    fn item<T: Value>(key: &str, value: T, changed: bool) -> Item {
        Item {
            key: ItemKey::of(key),
            fingerprint: ContentHash::of(&value),
            value: Arc::new(value),
            changed,
        }
    }

    fn map_fn<T, U>(
        f: impl Fn(&T) -> Result<U, TransformError> + Send + Sync + 'static,
    ) -> MapFn<T, U> {
        Box::new(f)
    }

    fn action_fn<T>(
        f: impl Fn(&mut OutputContext<'_>, &T) -> Result<(), EmitError> + Send + Sync + 'static,
    ) -> ActionFn<T> {
        Box::new(f)
    }

    /// `values` ordered by the key each one was stored under.
    fn in_key_order<T: Clone>(values: &[(&str, T)]) -> Vec<T> {
        let mut values = values.to_vec();
        values.sort_by_key(|(key, _)| ItemKey::of(*key));
        values.into_iter().map(|(_, v)| v).collect()
    }

    fn values<T: Value>(output: &NodeOutput) -> Vec<T> {
        output
            .items
            .iter()
            .map(|item| item.value.downcast_ref::<T>().unwrap().clone())
            .collect()
    }

    #[test]
    fn map_recomputes_then_reuses() {
        let op = MapOp::new(map_fn(|v: &i32| Ok(v * 10)));
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true), item("b", 2, true)],
        };

        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(values::<i32>(&first.output), vec![10, 20]);
        assert_eq!(first.recomputed, 2);
        harness.commit(first);

        let upstream = NodeOutput {
            items: vec![item("a", 1, false), item("b", 3, true)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(values::<i32>(&second.output), vec![10, 30]);
        assert_eq!((second.reused, second.recomputed), (1, 1));
        assert!(!second.output.items[0].changed);
        assert!(second.output.items[1].changed);
    }

    #[test]
    fn map_early_cutoff_marks_equal_results_unchanged() {
        let op = MapOp::new(map_fn(|v: &i32| Ok(*v > 0)));
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        harness.commit(first);

        let upstream = NodeOutput {
            items: vec![item("a", 5, true)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(second.recomputed, 1);
        assert!(!second.output.items[0].changed);
    }

    #[test]
    fn try_map_failure_drops_only_that_item() {
        let op = MapOp::new(map_fn(|v: &i32| {
            if *v < 0 {
                Err(TransformError::new("negative"))
            } else {
                Ok(*v)
            }
        }));
        let harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", -1, true), item("b", 2, true)],
        };
        let result = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(values::<i32>(&result.output), vec![2]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].id.as_str(), TRANSFORM_FAILED);
        assert_eq!(result.diagnostics[0].category, "Transform");
        assert!(result.diagnostics[0].message.contains("negative"));
        assert_eq!(result.entries.len(), 1);
    }

    #[test]
    fn verify_reuse_detects_impure_transform() {
        use std::sync::atomic::{AtomicI32, Ordering};
        let counter = Arc::new(AtomicI32::new(0));
        let seen = Arc::clone(&counter);
        let op = MapOp::new(map_fn(move |v: &i32| Ok(v + seen.fetch_add(1, Ordering::SeqCst))));
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        harness.commit(first);

        let upstream = NodeOutput {
            items: vec![item("a", 1, false)],
        };
        let mut cx = harness.cx(vec![&upstream]);
        cx.verify_reuse = true;
        let err = op.evaluate(&cx).err().unwrap();
        assert!(matches!(err, PassError::InvariantViolation { .. }));
    }

    #[test]
    fn filter_keeps_keys_and_membership() {
        let op = FilterOp::<i32>::new(Box::new(|v: &i32| v % 2 == 0));
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true), item("b", 2, true), item("c", 4, true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(values::<i32>(&first.output), vec![2, 4]);
        assert_eq!(first.output.items[0].key, ItemKey::of("b"));
        harness.commit(first);

        // Removing `b` leaves `c` with its own key.
        let upstream = NodeOutput {
            items: vec![item("a", 1, false), item("c", 4, false)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(second.output.items.len(), 1);
        assert_eq!(second.output.items[0].key, ItemKey::of("c"));
        assert_eq!(second.reused, 2);
    }

    #[test]
    fn collect_ignores_order() {
        let op = CollectOp::<i32>::new();
        let expected = in_key_order(&[("a", 1), ("b", 2)]);
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true), item("b", 2, true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(values::<Vec<i32>>(&first.output), vec![expected.clone()]);
        harness.commit(first);

        let upstream = NodeOutput {
            items: vec![item("b", 2, false), item("a", 1, false)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(second.reused, 1);
        assert_eq!(values::<Vec<i32>>(&second.output), vec![expected]);
        assert!(!second.output.items[0].changed);
    }

    #[test]
    fn collect_order_does_not_depend_on_arrival() {
        let op = CollectOp::<i32>::new();
        let harness = Harness::new();
        let forward = NodeOutput {
            items: vec![item("a", 1, true), item("b", 2, true), item("c", 3, true)],
        };
        let backward = NodeOutput {
            items: vec![item("c", 3, true), item("b", 2, true), item("a", 1, true)],
        };
        let cold_forward = op.evaluate(&harness.cx(vec![&forward])).unwrap();
        let cold_backward = op.evaluate(&harness.cx(vec![&backward])).unwrap();
        assert_eq!(
            values::<Vec<i32>>(&cold_forward.output),
            values::<Vec<i32>>(&cold_backward.output)
        );
        assert_eq!(
            values::<Vec<i32>>(&cold_forward.output),
            vec![in_key_order(&[("a", 1), ("b", 2), ("c", 3)])]
        );
    }

    #[test]
    fn partition_invalidates_only_changed_groups() {
        let op = PartitionOp::<String, i32>::new();
        let mut harness = Harness::new();
        let pair = |key: &str, group: &str, v: i32, changed| item(key, (group.to_string(), v), changed);
        let upstream = NodeOutput {
            items: vec![pair("a", "x", 1, true), pair("b", "y", 2, true), pair("c", "x", 3, true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        let groups = values::<Group<String, i32>>(&first.output);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "x");
        assert_eq!(groups[0].members, in_key_order(&[("a", 1), ("c", 3)]));
        harness.commit(first);

        let upstream = NodeOutput {
            items: vec![pair("a", "x", 1, false), pair("b", "y", 5, true), pair("c", "x", 3, false)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!((second.reused, second.recomputed), (1, 1));
        assert!(!second.output.items[0].changed);
        assert!(second.output.items[1].changed);
    }

    #[test]
    fn partition_members_follow_key_order() {
        let op = PartitionOp::<String, i32>::new();
        let harness = Harness::new();
        let pair = |key: &str, v: i32| item(key, ("x".to_string(), v), true);
        let forward = NodeOutput {
            items: vec![pair("a", 1), pair("b", 2)],
        };
        let backward = NodeOutput {
            items: vec![pair("b", 2), pair("a", 1)],
        };
        let from_forward = values::<Group<String, i32>>(&op.evaluate(&harness.cx(vec![&forward])).unwrap().output);
        let from_backward = values::<Group<String, i32>>(&op.evaluate(&harness.cx(vec![&backward])).unwrap().output);
        assert_eq!(from_forward, from_backward);
        assert_eq!(from_forward[0].members, in_key_order(&[("a", 1), ("b", 2)]));
    }

    #[test]
    fn combine_pairs_with_single_value() {
        let op = CombineOp::<i32, String>::new();
        let harness = Harness::new();
        let left = NodeOutput {
            items: vec![item("a", 1, true), item("b", 2, true)],
        };
        let right = NodeOutput {
            items: vec![item("unit", "opt".to_string(), true)],
        };
        let result = op.evaluate(&harness.cx(vec![&left, &right])).unwrap();
        let pairs = values::<(i32, String)>(&result.output);
        assert_eq!(pairs, vec![(1, "opt".to_string()), (2, "opt".to_string())]);

        let empty = NodeOutput::default();
        let result = op.evaluate(&harness.cx(vec![&left, &empty])).unwrap();
        assert!(result.output.items.is_empty());
    }

    #[test]
    fn output_replays_unchanged_items() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let op = OutputOp::new(action_fn(move |ctx, name: &String| {
            seen.fetch_add(1, Ordering::SeqCst);
            ctx.add_artifact(format!("{name}.cs"), "//")?;
            Ok(())
        }));
        let mut harness = Harness::new();
        let upstream = NodeOutput {
            items: vec![item("a", "A".to_string(), true)],
        };
        let first = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(harness.sink.artifact_count(), 1);
        harness.commit(first);
        harness.sink = OutputSink::new(DiagnosticPolicy::default());

        let upstream = NodeOutput {
            items: vec![item("a", "A".to_string(), false)],
        };
        let second = op.evaluate(&harness.cx(vec![&upstream])).unwrap();
        assert_eq!(second.reused, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.sink.artifact_count(), 1);
    }

    #[test]
    fn output_stops_when_cancelled() {
        let op = OutputOp::new(action_fn(|_, _: &i32| Ok(())));
        let harness = Harness::new();
        harness.cancel.cancel();
        let upstream = NodeOutput {
            items: vec![item("a", 1, true)],
        };
        let err = op.evaluate(&harness.cx(vec![&upstream])).err().unwrap();
        assert!(err.is_cancelled());
    }
}
