// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory property graph understanding a small Cypher subset.
//!
//! Supported statement shapes:
//!
//! ```text
//! CREATE (n:Label $props) [RETURN n]
//! MATCH <pattern> [WHERE v.f = $p AND ...] <tail>
//!
//! pattern: (v:Label) | (a:L), (b:L) | (a:L)-[r:KIND]->(b:L)
//! tail:    RETURN v, ... [LIMIT k]
//!          SET v = $props [RETURN v]
//!          WITH v LIMIT k DETACH DELETE v
//!          CREATE (a)-[r:KIND]->(b) [RETURN ...]
//! ```
//!
//! Each statement runs under one lock, so a version-filtered `SET` is an
//! atomic compare-and-write. Statements require an open session.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::traits::{AccessMode, GraphClient, GraphRow, GraphValue, Statement, StorageError};
use crate::record::Record;

const KEYWORDS: &[&str] = &["WHERE", "RETURN", "SET", "WITH", "DETACH DELETE", "CREATE"];

#[derive(Debug, Clone)]
struct Node {
    labels: Vec<String>,
    properties: Record,
}

#[derive(Debug, Clone)]
struct Relationship {
    start: i64,
    end: i64,
    kind: String,
    properties: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Node(i64),
    Relationship(i64),
}

type Binding = Vec<(String, Bound)>;

#[derive(Default)]
struct GraphState {
    nodes: BTreeMap<i64, Node>,
    relationships: BTreeMap<i64, Relationship>,
    next_id: i64,
}

impl GraphState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn value_of(&self, bound: Bound) -> Option<GraphValue> {
        match bound {
            Bound::Node(id) => self.nodes.get(&id).map(|node| GraphValue::Node {
                id,
                labels: node.labels.clone(),
                properties: node.properties.clone(),
            }),
            Bound::Relationship(id) => self.relationships.get(&id).map(|rel| GraphValue::Relationship {
                start: rel.start,
                end: rel.end,
                kind: rel.kind.clone(),
                properties: rel.properties.clone(),
            }),
        }
    }

    fn properties_of(&self, bound: Bound) -> Option<&Record> {
        match bound {
            Bound::Node(id) => self.nodes.get(&id).map(|n| &n.properties),
            Bound::Relationship(id) => self.relationships.get(&id).map(|r| &r.properties),
        }
    }
}

pub struct MemoryGraph {
    state: Mutex<GraphState>,
    sessions: AtomicUsize,
    opened: AtomicUsize,
    statements: Mutex<Vec<(Statement, AccessMode)>>,
    unavailable: AtomicBool,
}

impl MemoryGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            sessions: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every run fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened over the client's lifetime.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Every statement run so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<(Statement, AccessMode)> {
        self.statements.lock().clone()
    }

    /// Properties of every node carrying `label`.
    #[must_use]
    pub fn nodes_with_label(&self, label: &str) -> Vec<Record> {
        self.state
            .lock()
            .nodes
            .values()
            .filter(|node| node.labels.iter().any(|l| l == label))
            .map(|node| node.properties.clone())
            .collect()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.state.lock().relationships.len()
    }

    fn execute(&self, statement: &Statement, mode: AccessMode) -> Result<Vec<GraphRow>, StorageError> {
        let text = format!("{} ", statement.text.trim());
        let mut state = self.state.lock();
        let exec = Execution {
            params: &statement.params,
            mode,
            text: &statement.text,
        };

        if let Some(rest) = strip_keyword(&text, "CREATE") {
            return exec.create_node(&mut state, rest);
        }
        let rest = strip_keyword(&text, "MATCH").ok_or_else(|| exec.unsupported())?;
        let (pattern, remainder) = split_at_keyword(rest);
        let mut bindings = exec.match_pattern(&state, pattern)?;

        let tail = match strip_keyword(remainder, "WHERE") {
            Some(conditions) => {
                let (conditions, tail) = split_at_keyword(conditions);
                bindings = exec.filter(&state, bindings, conditions)?;
                tail
            }
            None => remainder,
        };
        exec.apply_tail(&mut state, tail, bindings)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

struct Execution<'a> {
    params: &'a Record,
    mode: AccessMode,
    text: &'a str,
}

impl Execution<'_> {
    fn unsupported(&self) -> StorageError {
        StorageError::Unsupported(self.text.to_string())
    }

    fn require_write(&self) -> Result<(), StorageError> {
        if self.mode == AccessMode::Read {
            return Err(StorageError::Backend(format!(
                "write statement in read transaction: {}",
                self.text
            )));
        }
        Ok(())
    }

    fn param(&self, token: &str) -> Result<&Value, StorageError> {
        let name = token.trim().strip_prefix('$').ok_or_else(|| self.unsupported())?;
        self.params
            .get(name)
            .ok_or_else(|| StorageError::Backend(format!("missing parameter ${name}")))
    }

    fn object_param(&self, token: &str) -> Result<Record, StorageError> {
        match self.param(token)? {
            Value::Object(map) => Ok(map.clone()),
            other => Err(StorageError::Backend(format!("expected a map parameter, got {other}"))),
        }
    }

    fn create_node(&self, state: &mut GraphState, rest: &str) -> Result<Vec<GraphRow>, StorageError> {
        self.require_write()?;
        let close = rest.find(')').ok_or_else(|| self.unsupported())?;
        let inner = rest.trim_start().strip_prefix('(').ok_or_else(|| self.unsupported())?;
        let inner = &inner[..inner.find(')').ok_or_else(|| self.unsupported())?];
        let mut parts = inner.split_whitespace();
        let (var, label) = parse_var_label(parts.next().unwrap_or_default());
        let properties = match parts.next() {
            Some(token) => self.object_param(token)?,
            None => Record::new(),
        };
        let id = state.allocate();
        state.nodes.insert(
            id,
            Node {
                labels: label.into_iter().collect(),
                properties,
            },
        );
        let binding = if var.is_empty() {
            Vec::new()
        } else {
            vec![(var, Bound::Node(id))]
        };
        let result = self.apply_tail(state, &rest[close + 1..], vec![binding]);
        if result.is_err() {
            state.nodes.remove(&id);
        }
        result
    }

    fn match_pattern(&self, state: &GraphState, pattern: &str) -> Result<Vec<Binding>, StorageError> {
        let pattern = pattern.trim();
        if let Some((left, rest)) = pattern.split_once("-[") {
            let (rel, right) = rest.split_once("]->").ok_or_else(|| self.unsupported())?;
            let (start_var, start_label) = parse_node(left).ok_or_else(|| self.unsupported())?;
            let (end_var, end_label) = parse_node(right).ok_or_else(|| self.unsupported())?;
            let (rel_var, kind) = parse_var_label(rel.trim());

            let mut bindings = Vec::new();
            for (rel_id, relationship) in &state.relationships {
                if kind.as_ref().is_some_and(|k| *k != relationship.kind) {
                    continue;
                }
                if !has_label(state, relationship.start, start_label.as_deref())
                    || !has_label(state, relationship.end, end_label.as_deref())
                {
                    continue;
                }
                let mut binding = Vec::new();
                push_bound(&mut binding, &start_var, Bound::Node(relationship.start));
                push_bound(&mut binding, &rel_var, Bound::Relationship(*rel_id));
                push_bound(&mut binding, &end_var, Bound::Node(relationship.end));
                bindings.push(binding);
            }
            return Ok(bindings);
        }

        let mut bindings: Vec<Binding> = vec![Vec::new()];
        for part in pattern.split(',') {
            let (var, label) = parse_node(part).ok_or_else(|| self.unsupported())?;
            let candidates: Vec<i64> = state
                .nodes
                .keys()
                .copied()
                .filter(|id| has_label(state, *id, label.as_deref()))
                .collect();
            let mut expanded = Vec::with_capacity(bindings.len() * candidates.len());
            for binding in &bindings {
                for id in &candidates {
                    let mut next = binding.clone();
                    push_bound(&mut next, &var, Bound::Node(*id));
                    expanded.push(next);
                }
            }
            bindings = expanded;
        }
        Ok(bindings)
    }

    fn filter(
        &self,
        state: &GraphState,
        bindings: Vec<Binding>,
        conditions: &str,
    ) -> Result<Vec<Binding>, StorageError> {
        let mut parsed = Vec::new();
        for condition in conditions.split(" AND ") {
            let (lhs, rhs) = condition.split_once('=').ok_or_else(|| self.unsupported())?;
            let (var, field) = lhs.trim().split_once('.').ok_or_else(|| self.unsupported())?;
            parsed.push((var.to_string(), field.to_string(), self.param(rhs)?.clone()));
        }
        Ok(bindings
            .into_iter()
            .filter(|binding| {
                parsed.iter().all(|(var, field, expected)| {
                    lookup(binding, var)
                        .and_then(|bound| state.properties_of(bound))
                        .and_then(|props| props.get(field))
                        == Some(expected)
                })
            })
            .collect())
    }

    fn apply_tail(
        &self,
        state: &mut GraphState,
        tail: &str,
        mut bindings: Vec<Binding>,
    ) -> Result<Vec<GraphRow>, StorageError> {
        let mut tail = tail.trim();
        loop {
            if tail.is_empty() {
                return Ok(Vec::new());
            }
            if let Some(rest) = strip_keyword(tail, "WITH") {
                let mut tokens = rest.split_whitespace();
                let _var = tokens.next();
                if tokens.next() != Some("LIMIT") {
                    return Err(self.unsupported());
                }
                let count = tokens.next().and_then(|t| t.parse::<usize>().ok());
                bindings.truncate(count.ok_or_else(|| self.unsupported())?);
                tail = rest
                    .trim_start()
                    .splitn(4, char::is_whitespace)
                    .nth(3)
                    .unwrap_or_default()
                    .trim();
            } else if let Some(rest) = strip_keyword(tail, "SET") {
                self.require_write()?;
                let (assignment, next) = split_at_keyword(rest);
                let (var, value) = assignment.split_once('=').ok_or_else(|| self.unsupported())?;
                let properties = self.object_param(value)?;
                for binding in &bindings {
                    if let Some(Bound::Node(id)) = lookup(binding, var.trim()) {
                        if let Some(node) = state.nodes.get_mut(&id) {
                            node.properties = properties.clone();
                        }
                    }
                }
                tail = next.trim();
            } else if let Some(rest) = strip_keyword(tail, "DETACH DELETE") {
                self.require_write()?;
                let (target, next) = split_at_keyword(rest);
                let var = target.trim().trim_start_matches('(').trim_end_matches(')');
                for binding in &bindings {
                    if let Some(Bound::Node(id)) = lookup(binding, var) {
                        state.nodes.remove(&id);
                        state.relationships.retain(|_, rel| rel.start != id && rel.end != id);
                    }
                }
                bindings.clear();
                tail = next.trim();
            } else if let Some(rest) = strip_keyword(tail, "CREATE") {
                self.require_write()?;
                let (path, next) = split_at_keyword(rest);
                let (left, rel_and_right) = path.split_once("-[").ok_or_else(|| self.unsupported())?;
                let (rel, right) = rel_and_right.split_once("]->").ok_or_else(|| self.unsupported())?;
                let (start_var, _) = parse_node(left).ok_or_else(|| self.unsupported())?;
                let (end_var, _) = parse_node(right).ok_or_else(|| self.unsupported())?;
                let mut rel_tokens = rel.split_whitespace();
                let (rel_var, kind) = parse_var_label(rel_tokens.next().unwrap_or_default());
                let properties = match rel_tokens.next() {
                    Some(token) => self.object_param(token)?,
                    None => Record::new(),
                };
                let kind = kind.ok_or_else(|| self.unsupported())?;
                // Resolve every endpoint pair before touching the graph.
                let endpoints = bindings
                    .iter()
                    .map(|binding| match (lookup(binding, &start_var), lookup(binding, &end_var)) {
                        (Some(Bound::Node(start)), Some(Bound::Node(end))) => Ok((start, end)),
                        _ => Err(self.unsupported()),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                for (binding, (start, end)) in bindings.iter_mut().zip(endpoints) {
                    let id = state.allocate();
                    state.relationships.insert(
                        id,
                        Relationship {
                            start,
                            end,
                            kind: kind.clone(),
                            properties: properties.clone(),
                        },
                    );
                    push_bound(binding, &rel_var, Bound::Relationship(id));
                }
                tail = next.trim();
            } else if let Some(rest) = strip_keyword(tail, "RETURN") {
                let (columns, limit) = match rest.split_once(" LIMIT ") {
                    Some((columns, limit)) => (columns, limit.trim().parse::<usize>().ok()),
                    None => (rest, None),
                };
                let mut rows = Vec::new();
                for binding in &bindings {
                    let mut row = Vec::new();
                    for column in columns.split(',') {
                        let var = column.trim().trim_start_matches('(').trim_end_matches(')');
                        let bound = lookup(binding, var).ok_or_else(|| self.unsupported())?;
                        if let Some(value) = state.value_of(bound) {
                            row.push(value);
                        }
                    }
                    rows.push(row);
                }
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                return Ok(rows);
            } else {
                return Err(self.unsupported());
            }
        }
    }
}

#[async_trait]
impl GraphClient for MemoryGraph {
    async fn open(&self) -> Result<(), StorageError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| open.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StorageError::Session("close without an open session".into()))
    }

    async fn run(&self, statement: &Statement, mode: AccessMode) -> Result<Vec<GraphRow>, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("graph unavailable".into()));
        }
        if self.open_sessions() == 0 {
            return Err(StorageError::Session("no open session".into()));
        }
        self.statements.lock().push((statement.clone(), mode));
        self.execute(statement, mode)
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix(keyword)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' => Some(rest),
        Some(_) => None,
    }
}

/// Split before the first top-level keyword.
fn split_at_keyword(text: &str) -> (&str, &str) {
    let position = KEYWORDS
        .iter()
        .filter_map(|keyword| text.find(&format!(" {keyword} ")))
        .min();
    match position {
        Some(index) => (&text[..index], &text[index..]),
        None => (text, ""),
    }
}

fn parse_var_label(token: &str) -> (String, Option<String>) {
    match token.split_once(':') {
        Some((var, label)) => (var.trim().to_string(), Some(label.trim().to_string())),
        None => (token.trim().to_string(), None),
    }
}

fn parse_node(text: &str) -> Option<(String, Option<String>)> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some(parse_var_label(inner.trim()))
}

fn has_label(state: &GraphState, id: i64, label: Option<&str>) -> bool {
    match (state.nodes.get(&id), label) {
        (Some(_), None) => true,
        (Some(node), Some(label)) => node.labels.iter().any(|l| l == label),
        (None, _) => false,
    }
}

fn push_bound(binding: &mut Binding, var: &str, bound: Bound) {
    if !var.is_empty() {
        binding.push((var.to_string(), bound));
    }
}

fn lookup(binding: &Binding, var: &str) -> Option<Bound> {
    binding.iter().find(|(name, _)| name == var).map(|(_, bound)| *bound)
}
