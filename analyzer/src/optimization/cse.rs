//! Branch-aware common subexpression detection
//!
//! Available expressions over the shared control-flow graph. A fact maps the
//! normalized key of every available expression to the sites that computed
//! it; the meet keeps only keys available on every incoming edge and unions
//! their sites. An expression computed in both arms of an `IF` therefore
//! survives the join, while one computed in a single arm does not.
//!
//! Expressions are generated while the statement is evaluated and killed
//! after its writes, so `X = X + 1` never leaves `X + 1` available.
//!
//! Array element reads are compared by their flattened index, so `A(I, J)`
//! and `a(i, j)` under the same layout are one opportunity.

use crate::optimization::array_flattening::flatten_index;
use crate::optimization::constant_folding::evaluate_constant;
use crate::pass_manager::{AnalysisContext, AnalysisPass, PassResult};
use crate::pipeline::AnalyzerConfig;
use crate::semantic_graph::{solve_forward, CfgNode, ControlFlowGraph, ForwardAnalysis, NodeEffects, NodeId};
use crate::symbols::SymbolTable;
use fxhash::FxHashMap;
use indexmap::IndexMap;
use parser::{Expr, ExprKind, LineNumber};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A statement node and the pre-order position of a subexpression in it
pub type Site = (NodeId, u32);

pub type AvailableSet = BTreeMap<String, BTreeSet<Site>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonSubexpression {
    /// Canonical text of the first computation
    pub expression: String,
    /// Linear index for array element reads
    pub flattened_index: Option<String>,
    pub first_line: LineNumber,
    /// Lines of every later computation, in program order
    pub occurrences: Vec<LineNumber>,
    pub variables: Vec<String>,
}

/// A subexpression worth reusing
#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    text: String,
    flattened_index: Option<String>,
    /// Number of candidates in this subtree, itself included
    span: usize,
}

struct Occurrence {
    key: String,
    site: Site,
    available: BTreeSet<Site>,
}

/// The available-expressions problem over one program
pub struct AvailableExpressions {
    candidates: Vec<Vec<Candidate>>,
    /// Scalars (`X`) and arrays (`A()`) each key reads
    reads: FxHashMap<String, BTreeSet<String>>,
    kills: Vec<Vec<String>>,
}

impl AvailableExpressions {
    pub fn new(cfg: &ControlFlowGraph<'_>, effects: &[NodeEffects<'_>], symbols: &SymbolTable) -> Self {
        let mut collector = CandidateCollector {
            symbols,
            reads: FxHashMap::default(),
        };
        let mut candidates = Vec::with_capacity(cfg.len());
        let mut kills = Vec::with_capacity(cfg.len());

        for node in cfg.nodes() {
            let mut list = Vec::new();
            let mut killed = Vec::new();
            if let Some(fx) = effects.get(node.id) {
                for root in &fx.roots {
                    collector.collect(root, &mut list);
                }
                killed.extend(fx.defs.iter().cloned());
                killed.extend(fx.array_defs.iter().map(|a| format!("{}()", a)));
            }
            candidates.push(list);
            kills.push(killed);
        }

        Self {
            candidates,
            reads: collector.reads,
            kills,
        }
    }

    /// Walk a node's candidates against `fact`, reporting those already available
    fn scan(&self, id: NodeId, fact: &mut AvailableSet, mut found: Option<&mut Vec<Occurrence>>) {
        let list = &self.candidates[id];
        let mut i = 0;
        while i < list.len() {
            let candidate = &list[i];
            let site = (id, i as u32);
            match fact.get_mut(&candidate.key) {
                Some(sites) => {
                    if let Some(found) = found.as_deref_mut() {
                        found.push(Occurrence {
                            key: candidate.key.clone(),
                            site,
                            available: sites.clone(),
                        });
                    }
                    sites.insert(site);
                    // The operands were computed along with the whole
                    i += candidate.span;
                }
                None => {
                    fact.insert(candidate.key.clone(), BTreeSet::from([site]));
                    i += 1;
                }
            }
        }

        for var in &self.kills[id] {
            fact.retain(|key, _| !self.reads.get(key).is_some_and(|r| r.contains(var)));
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().map(Vec::len).sum()
    }
}

impl<'p> ForwardAnalysis<'p> for AvailableExpressions {
    type Fact = AvailableSet;

    fn name(&self) -> &'static str {
        "available-expressions"
    }

    fn entry_fact(&self) -> Self::Fact {
        AvailableSet::new()
    }

    fn meet(&self, left: &Self::Fact, right: &Self::Fact) -> Self::Fact {
        left.iter()
            .filter_map(|(key, sites)| {
                let other = right.get(key)?;
                Some((key.clone(), sites.union(other).copied().collect()))
            })
            .collect()
    }

    fn transfer(&self, node: &CfgNode<'p>, input: &Self::Fact) -> Self::Fact {
        let mut fact = input.clone();
        self.scan(node.id, &mut fact, None);
        fact
    }
}

struct CandidateCollector<'s> {
    symbols: &'s SymbolTable,
    reads: FxHashMap<String, BTreeSet<String>>,
}

impl CandidateCollector<'_> {
    /// Pre-order candidates of `expr`, returns how many were pushed
    fn collect(&mut self, expr: &Expr, out: &mut Vec<Candidate>) -> usize {
        let slot = out.len();
        let pushed = match self.candidate(expr) {
            Some(candidate) => {
                out.push(candidate);
                true
            }
            None => false,
        };
        let mut count = usize::from(pushed);
        for child in expr.children() {
            count += self.collect(child, out);
        }
        if pushed {
            out[slot].span = count;
        }
        count
    }

    fn candidate(&mut self, expr: &Expr) -> Option<Candidate> {
        if expr.has_side_effects() || evaluate_constant(expr).is_some() {
            return None;
        }
        let worth = match &expr.kind {
            ExprKind::Binary { .. } => true,
            ExprKind::ArrayElement { .. } => true,
            ExprKind::Builtin { args, .. } => !args.is_empty(),
            ExprKind::Unary { operand, .. } => !operand.is_trivial(),
            _ => false,
        };
        if !worth {
            return None;
        }

        let (key, flattened_index) = match &expr.kind {
            ExprKind::ArrayElement { name, indices } => match self.symbols.array_layout(&name.key) {
                Some(layout) => match flatten_index(&layout, indices) {
                    Some(index) => (format!("{}[{}]", name.key, index), Some(index.to_string())),
                    None => (expr.normalized_key(), None),
                },
                None => (expr.normalized_key(), None),
            },
            _ => (expr.normalized_key(), None),
        };

        self.reads.entry(key.clone()).or_insert_with(|| referenced(expr));
        Some(Candidate {
            key,
            text: expr.to_string(),
            flattened_index,
            span: 0,
        })
    }
}

/// Scalars and arrays an expression reads
fn referenced(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match &e.kind {
            ExprKind::Variable(id) => {
                names.insert(id.key.clone());
            }
            ExprKind::ArrayElement { name, .. } => {
                names.insert(format!("{}()", name.key));
            }
            _ => {}
        }
        stack.extend(e.children());
    }
    names
}

/// Group matched occurrences into one record per origin
fn assemble(
    cfg: &ControlFlowGraph<'_>,
    analysis: &AvailableExpressions,
    occurrences: Vec<Occurrence>,
) -> Vec<CommonSubexpression> {
    let mut groups: IndexMap<(String, Site), BTreeSet<Site>> = IndexMap::new();
    for occurrence in occurrences {
        let Some(&origin) = occurrence.available.iter().next() else {
            continue;
        };
        let sites = groups.entry((occurrence.key, origin)).or_default();
        sites.extend(occurrence.available);
        sites.insert(occurrence.site);
    }

    let mut records: Vec<CommonSubexpression> = groups
        .into_iter()
        .map(|((key, origin), sites)| {
            let candidate = &analysis.candidates[origin.0][origin.1 as usize];
            let variables = analysis
                .reads
                .get(&key)
                .map(|r| r.iter().cloned().collect())
                .unwrap_or_default();
            CommonSubexpression {
                expression: candidate.text.clone(),
                flattened_index: candidate.flattened_index.clone(),
                first_line: cfg.node(origin.0).line,
                occurrences: sites
                    .iter()
                    .filter(|&&s| s != origin)
                    .map(|&(node, _)| cfg.node(node).line)
                    .collect(),
                variables,
            }
        })
        .collect();
    records.sort_by(|a, b| {
        (a.first_line, &a.expression, &a.occurrences).cmp(&(b.first_line, &b.expression, &b.occurrences))
    });
    records
}

/// Detect common subexpressions over a built graph
pub fn find_common_subexpressions(
    cfg: &ControlFlowGraph<'_>,
    effects: &[NodeEffects<'_>],
    symbols: &SymbolTable,
) -> Vec<CommonSubexpression> {
    let analysis = AvailableExpressions::new(cfg, effects, symbols);
    log::trace!("cse: {} candidate subexpressions", analysis.candidate_count());
    let solution = solve_forward(cfg, &analysis);

    let mut occurrences = Vec::new();
    for node in cfg.nodes() {
        if let Some(before) = solution.before(node.id) {
            let mut fact = before.clone();
            analysis.scan(node.id, &mut fact, Some(&mut occurrences));
        }
    }
    assemble(cfg, &analysis, occurrences)
}

pub struct CsePass;

impl CsePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsePass {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisPass for CsePass {
    fn name(&self) -> &'static str {
        "common-subexpressions"
    }

    fn is_enabled(&self, config: &AnalyzerConfig) -> bool {
        config.enable_cse
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> PassResult {
        let records = find_common_subexpressions(&ctx.cfg, &ctx.effects, &ctx.symbols);
        let count = records.len();
        ctx.findings.common_subexpressions = records;
        PassResult::with_findings(count)
    }
}
