//! Provider handles, the pipeline builder, and the frozen pipeline graph.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use weft_common::{ContentHash, Fingerprint};

use crate::error::{GraphConstructionError, TransformError};
use crate::input::{AdditionalText, BuildOptions, SyntaxFragment, Tagged};
use crate::operator::{
    CollectOp, CombineOp, FilterOp, MapOp, Operator, OutputOp, PartitionOp, SourceOp,
};
use crate::output::{EmitError, OutputContext};
use crate::value::{ItemKey, NodeId, Value};

/// Whether a node yields any number of items or at most one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    Many,
    One,
}

/// The items of one `group_by` key, ordered by item key so the same members
/// always form the same value.
#[derive(Clone, Debug, PartialEq, Hash)]
pub struct Group<K, V> {
    pub key: K,
    pub members: Vec<V>,
}

pub(crate) struct NodeSpec {
    pub label: String,
    pub inputs: Vec<NodeId>,
    pub arity: Arity,
    pub terminal: bool,
    pub op: Box<dyn Operator>,
}

#[derive(Default)]
struct GraphState {
    nodes: Vec<NodeSpec>,
    errors: Vec<GraphConstructionError>,
}

impl GraphState {
    fn add(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(spec);
        id
    }
}

type SharedGraph = Arc<Mutex<GraphState>>;

fn lock(graph: &SharedGraph) -> std::sync::MutexGuard<'_, GraphState> {
    graph.lock().unwrap_or_else(|e| e.into_inner())
}

/// A typed handle to one node of a pipeline under construction.
///
/// Combinators take `&self`, so one provider can feed several branches.
pub struct Provider<T> {
    graph: SharedGraph,
    node: NodeId,
    arity: Arity,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            node: self.node,
            arity: self.arity,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("node", &self.node)
            .field("arity", &self.arity)
            .finish()
    }
}

impl<T: Value> Provider<T> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    fn derive<U: Value>(
        &self,
        label: String,
        inputs: Vec<NodeId>,
        arity: Arity,
        op: Box<dyn Operator>,
    ) -> Provider<U> {
        let node = lock(&self.graph).add(NodeSpec {
            label,
            inputs,
            arity,
            terminal: false,
            op,
        });
        Provider {
            graph: Arc::clone(&self.graph),
            node,
            arity,
            _marker: PhantomData,
        }
    }

    fn unary<U: Value>(&self, label: impl Into<String>, arity: Arity, op: Box<dyn Operator>) -> Provider<U> {
        self.derive(label.into(), vec![self.node], arity, op)
    }

    /// Transforms every item. Unchanged items are not transformed again.
    pub fn map<U: Value>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Provider<U> {
        self.unary(
            "map",
            self.arity,
            Box::new(MapOp::<T, U>::new(Box::new(move |value: &T| Ok::<U, TransformError>(f(value))))),
        )
    }

    /// Like [`map`](Self::map), but an `Err` fails only that item and is
    /// reported as a `WEFT001` diagnostic.
    pub fn try_map<U: Value>(
        &self,
        f: impl Fn(&T) -> Result<U, TransformError> + Send + Sync + 'static,
    ) -> Provider<U> {
        self.unary("try_map", self.arity, Box::new(MapOp::<T, U>::new(Box::new(f))))
    }

    /// Keeps the items matching `predicate`, with their keys unchanged.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Provider<T> {
        self.filter_labelled("filter".to_string(), predicate)
    }

    fn filter_labelled(
        &self,
        label: String,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Provider<T> {
        self.unary(label, self.arity, Box::new(FilterOp::<T>::new(Box::new(predicate))))
    }

    /// Gathers every item into one `Vec`, ordered by item key. Reordering the
    /// same items does not invalidate or change the result.
    pub fn collect(&self) -> Provider<Vec<T>> {
        self.unary("collect", Arity::One, Box::new(CollectOp::<T>::new()))
    }

    /// Partitions items into one [`Group`] per distinct key.
    ///
    /// A group is recomputed only when its own members change.
    pub fn group_by<K: Value>(&self, key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Provider<Group<K, T>> {
        let keyed: Provider<(K, T)> = self.unary(
            "group_by.key",
            self.arity,
            Box::new(MapOp::<T, (K, T)>::new(Box::new(move |value: &T| {
                Ok::<(K, T), TransformError>((key_fn(value), value.clone()))
            }))),
        );
        keyed.unary("group_by", Arity::Many, Box::new(PartitionOp::<K, T>::new()))
    }

    /// Pairs every item with the single value of `other`.
    pub fn combine<R: Value>(&self, other: &Provider<R>) -> Provider<(T, R)> {
        if !Arc::ptr_eq(&self.graph, &other.graph) {
            lock(&self.graph)
                .errors
                .push(GraphConstructionError::ForeignProvider { node: other.node });
        } else if other.arity != Arity::One {
            lock(&self.graph).errors.push(GraphConstructionError::InvalidCombine {
                left: self.node,
                right: other.node,
            });
        }
        self.derive(
            "combine".to_string(),
            vec![self.node, other.node],
            self.arity,
            Box::new(CombineOp::<T, R>::new()),
        )
    }
}

impl<T: Value + Tagged> Provider<T> {
    /// Keeps the items whose [`Tagged::tag`] equals `tag`.
    pub fn where_kind(&self, tag: impl Into<String>) -> Provider<T> {
        let tag = tag.into();
        let label = format!("where_kind({tag})");
        self.filter_labelled(label, move |value: &T| value.tag() == tag)
    }
}

impl Provider<BuildOptions> {
    /// Reads a single build option.
    pub fn select_option(&self, key: impl Into<String>) -> Provider<Option<String>> {
        let key = key.into();
        let label = format!("select_option({key})");
        self.unary(
            label,
            self.arity,
            Box::new(MapOp::<BuildOptions, Option<String>>::new(Box::new(move |options: &BuildOptions| {
                Ok::<_, TransformError>(options.get(&key).map(str::to_string))
            }))),
        )
    }
}

/// Composes a pipeline graph.
///
/// ```ignore
/// let builder = PipelineBuilder::new();
/// let fields = builder.syntax().where_kind("field");
/// builder.register_output(&fields, |ctx, field| {
///     ctx.add_artifact(format!("{}.g.cs", field.id), "// generated")?;
///     Ok(())
/// });
/// let pipeline = builder.build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    graph: SharedGraph,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn source<T: Value>(
        &self,
        label: &str,
        arity: Arity,
        extract: impl Fn(&crate::input::InputSnapshot) -> Vec<(ItemKey, T)> + Send + Sync + 'static,
    ) -> Provider<T> {
        let node = lock(&self.graph).add(NodeSpec {
            label: label.to_string(),
            inputs: Vec::new(),
            arity,
            terminal: false,
            op: Box::new(SourceOp::<T>::new(Box::new(extract))),
        });
        Provider {
            graph: Arc::clone(&self.graph),
            node,
            arity,
            _marker: PhantomData,
        }
    }

    /// Every syntax fragment of the snapshot, keyed by fragment id.
    pub fn syntax(&self) -> Provider<SyntaxFragment> {
        self.source("syntax", Arity::Many, |snapshot| {
            snapshot
                .fragments()
                .map(|fragment| (ItemKey::of(&fragment.identity()), fragment.clone()))
                .collect()
        })
    }

    /// Every additional text of the snapshot, keyed by path.
    pub fn texts(&self) -> Provider<AdditionalText> {
        self.source("texts", Arity::Many, |snapshot| {
            snapshot
                .texts()
                .map(|text| (ItemKey::of(&text.identity()), text.clone()))
                .collect()
        })
    }

    /// The global build options as one value.
    pub fn options(&self) -> Provider<BuildOptions> {
        self.source("options", Arity::One, |snapshot| {
            vec![(ItemKey::UNIT, snapshot.global_options())]
        })
    }

    /// A value that never changes between passes.
    pub fn constant<T: Value>(&self, value: T) -> Provider<T> {
        self.source("constant", Arity::One, move |_| vec![(ItemKey::UNIT, value.clone())])
    }

    /// Registers a terminal output. `action` runs once per changed item.
    pub fn register_output<T: Value>(
        &self,
        provider: &Provider<T>,
        action: impl Fn(&mut OutputContext<'_>, &T) -> Result<(), EmitError> + Send + Sync + 'static,
    ) {
        self.terminal("output", provider, action);
    }

    /// Registers an output that runs once, independent of any input.
    pub fn register_post_initialization(
        &self,
        action: impl Fn(&mut OutputContext<'_>) -> Result<(), EmitError> + Send + Sync + 'static,
    ) {
        let unit = self.constant(());
        self.terminal("post_initialization", &unit, move |ctx, _: &()| action(ctx));
    }

    fn terminal<T: Value>(
        &self,
        label: &str,
        provider: &Provider<T>,
        action: impl Fn(&mut OutputContext<'_>, &T) -> Result<(), EmitError> + Send + Sync + 'static,
    ) {
        let mut graph = lock(&self.graph);
        if !Arc::ptr_eq(&self.graph, &provider.graph) {
            graph
                .errors
                .push(GraphConstructionError::ForeignProvider { node: provider.node });
            return;
        }
        graph.add(NodeSpec {
            label: label.to_string(),
            inputs: vec![provider.node],
            arity: provider.arity,
            terminal: true,
            op: Box::new(OutputOp::<T>::new(Box::new(action))),
        });
    }

    /// Freezes the graph. Providers created from this builder must not be
    /// extended afterwards.
    pub fn build(self) -> Result<Pipeline, GraphConstructionError> {
        let mut graph = lock(&self.graph);
        if let Some(err) = graph.errors.first() {
            return Err(err.clone());
        }
        Pipeline::new(std::mem::take(&mut graph.nodes))
    }
}

/// An immutable, validated provider graph.
pub struct Pipeline {
    nodes: Vec<NodeSpec>,
    levels: Vec<Vec<NodeId>>,
    fingerprint: Fingerprint,
}

impl Pipeline {
    pub(crate) fn new(nodes: Vec<NodeSpec>) -> Result<Self, GraphConstructionError> {
        if !nodes.iter().any(|node| node.terminal) {
            return Err(GraphConstructionError::NoOutputs);
        }

        let mut graph = DiGraph::<NodeId, ()>::with_capacity(nodes.len(), nodes.len());
        let indices: Vec<NodeIndex> = (0..nodes.len())
            .map(|i| graph.add_node(NodeId::from_raw(i as u32)))
            .collect();
        for (i, node) in nodes.iter().enumerate() {
            for input in &node.inputs {
                let Some(&from) = indices.get(input.index()) else {
                    return Err(GraphConstructionError::ForeignProvider { node: *input });
                };
                graph.add_edge(from, indices[i], ());
            }
        }
        let order = toposort(&graph, None).map_err(|cycle| GraphConstructionError::Cycle {
            node: graph[cycle.node_id()],
        })?;

        // Level = length of the longest path from a source; nodes in one
        // level never depend on each other.
        let mut depth = vec![0usize; nodes.len()];
        for index in order {
            let id = graph[index];
            depth[id.index()] = nodes[id.index()]
                .inputs
                .iter()
                .map(|input| depth[input.index()] + 1)
                .max()
                .unwrap_or(0);
        }
        let level_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut levels = vec![Vec::new(); level_count];
        for (i, d) in depth.iter().enumerate() {
            levels[*d].push(NodeId::from_raw(i as u32));
        }

        let shape: Vec<(&str, Vec<u32>, bool)> = nodes
            .iter()
            .map(|node| {
                (
                    node.label.as_str(),
                    node.inputs.iter().map(|input| input.as_raw()).collect(),
                    node.terminal,
                )
            })
            .collect();
        let fingerprint = ContentHash::of(&shape);

        Ok(Self {
            nodes,
            levels,
            fingerprint,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn output_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.terminal).count()
    }

    pub fn label(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.index()).map(|spec| spec.label.as_str())
    }

    pub fn arity(&self, node: NodeId) -> Option<Arity> {
        self.nodes.get(node.index()).map(|spec| spec.arity)
    }

    /// Nodes grouped by topological level, in evaluation order.
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// Digest of the graph shape. Persisted state is only reused for a
    /// pipeline with the same fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub(crate) fn spec(&self, node: NodeId) -> &NodeSpec {
        &self.nodes[node.index()]
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.nodes.iter().map(|node| node.label.as_str()).collect();
        f.debug_struct("Pipeline")
            .field("nodes", &labels)
            .field("levels", &self.levels.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
