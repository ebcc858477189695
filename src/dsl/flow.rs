//! The authoring surface handed to block bodies.

use crate::error::CompileError;
use crate::runtime::{stdlib, Arity, BranchMode, Direction, FunctionInfo};

use super::context::{ContextId, Owner, ScopeKind};
use super::items::{
    AggregateItem, AggregateSpec, BranchSetItem, CallItem, InsertItem, LookupItem, RecordItem,
};
use super::{Builder, Reference, Value};

/// One scope of a block body.
///
/// The root flow is the block itself; [`Flow::not`], [`Flow::choose`] and
/// [`Flow::union`] hand nested flows to their closures.
pub struct Flow<'b> {
    builder: &'b mut Builder,
    context: ContextId,
}

/// The attribute and value references produced by [`Flow::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// The attribute name.
    pub attribute: Reference,
    /// The attribute's value.
    pub value: Reference,
}

impl<'b> Flow<'b> {
    pub(crate) fn new(builder: &'b mut Builder, context: ContextId) -> Self {
        Self { builder, context }
    }

    fn is_root(&self) -> bool {
        self.context == Builder::root()
    }

    fn free(&mut self) -> Reference {
        self.builder.new_reference(self.context, Owner::Free)
    }

    /// A reference for `value`, creating one bound to the literal if needed.
    fn reference_for(&mut self, value: Value) -> Reference {
        match value {
            Value::Ref(reference) => {
                self.builder.register(self.context, reference);
                reference
            }
            raw @ Value::Raw(_) => {
                let reference = self.free();
                self.builder.equality(self.context, reference.into(), raw);
                reference
            }
        }
    }

    fn tagged<K, V>(tags: &[&str], attributes: impl IntoIterator<Item = (K, V)>) -> Vec<(Value, Value)>
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        tags.iter()
            .map(|tag| (Value::from("tag"), Value::from(*tag)))
            .chain(attributes.into_iter().map(|(a, v)| (a.into(), v.into())))
            .collect()
    }

    /// A record carrying every tag in `tags`.
    pub fn find(&mut self, tags: &[&str]) -> Reference {
        self.find_with(tags, std::iter::empty::<(&str, Value)>())
    }

    /// A record carrying every tag in `tags` and every given attribute.
    pub fn find_with<K, V>(
        &mut self,
        tags: &[&str],
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Reference
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let attributes = Self::tagged(tags, attributes);
        for (attribute, value) in &attributes {
            self.builder.register_value(self.context, attribute);
            self.builder.register_value(self.context, value);
        }
        let ix = self.builder.records.len();
        let record = self.builder.new_reference(self.context, Owner::Record(ix));
        self.builder.records.push(RecordItem {
            context: self.context,
            record,
            attributes,
        });
        self.builder.context_mut(self.context).items.records.push(ix);
        record
    }

    /// A holder record item owning a fresh reference, so the reference can
    /// itself be treated as a record.
    fn holder(&mut self) -> Reference {
        let ix = self.builder.records.len();
        let reference = self.builder.new_reference(self.context, Owner::Record(ix));
        self.builder.records.push(RecordItem {
            context: self.context,
            record: reference,
            attributes: Vec::new(),
        });
        self.builder.context_mut(self.context).items.records.push(ix);
        reference
    }

    /// An attribute already read for `record` in this scope or an
    /// enclosing one.
    fn known_attribute(&self, record: Reference, name: &str) -> Option<Value> {
        let attribute = Value::from(name);
        let mut current = Some(self.context);
        while let Some(context) = current {
            for ix in &self.builder.context(context).items.records {
                let item = &self.builder.records[*ix];
                if item.record != record {
                    continue;
                }
                if let Some((_, value)) = item.attributes.iter().find(|(a, _)| *a == attribute) {
                    return Some(value.clone());
                }
            }
            current = self.builder.context(context).parent;
        }
        None
    }

    /// The value of attribute `name` of `record`.
    ///
    /// On a record being created this returns the value it was given.
    /// Anything else is treated as an entity and gets a scan for the
    /// attribute in the current scope.
    pub fn attr(&mut self, record: Reference, name: &str) -> Reference {
        match self.builder.owner(record) {
            Owner::Record(_) | Owner::Call | Owner::Aggregate | Owner::Free => {
                if let Some(value) = self.known_attribute(record, name) {
                    return self.reference_for(value);
                }
                self.builder.register(self.context, record);
                let existing = self.builder.context(self.context).items.records.iter().copied().find(
                    |ix| self.builder.records[*ix].record == record,
                );
                let ix = match existing {
                    Some(ix) => ix,
                    None => {
                        let ix = self.builder.records.len();
                        self.builder.records.push(RecordItem {
                            context: self.context,
                            record,
                            attributes: Vec::new(),
                        });
                        self.builder.context_mut(self.context).items.records.push(ix);
                        ix
                    }
                };
                let value = self.holder();
                self.builder.records[ix].attributes.push((name.into(), value.into()));
                value
            }
            Owner::Insert(ix) => {
                let attribute = Value::from(name);
                let value = self.builder.inserts[ix]
                    .attributes
                    .iter()
                    .find(|(a, _)| *a == attribute)
                    .map(|(_, v)| v.clone());
                match value {
                    Some(value) => self.reference_for(value),
                    None => {
                        self.builder.error(CompileError::UnsetAttribute {
                            attribute: name.to_string(),
                        });
                        self.free()
                    }
                }
            }
        }
    }

    /// Every attribute and value of `record`.
    pub fn lookup(&mut self, record: Reference) -> Lookup {
        self.builder.register(self.context, record);
        let attribute = self.holder();
        let value = self.holder();
        let ix = self.builder.lookups.len();
        self.builder.lookups.push(LookupItem {
            context: self.context,
            record: record.into(),
            attribute,
            value,
        });
        self.builder.context_mut(self.context).items.lookups.push(ix);
        Lookup { attribute, value }
    }

    /// Create a record with `tags`. Its identity is generated from its
    /// attributes.
    pub fn record(&mut self, tags: &[&str]) -> Reference {
        self.record_with(tags, std::iter::empty::<(&str, Value)>())
    }

    /// Create a record with `tags` and the given attributes.
    pub fn record_with<K, V>(
        &mut self,
        tags: &[&str],
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Reference
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        if !self.is_root() {
            self.builder.error(CompileError::AddInSubBlock);
            return self.free();
        }
        let attributes = Self::tagged(tags, attributes);
        for (attribute, value) in &attributes {
            self.builder.register_value(self.context, attribute);
            self.builder.register_value(self.context, value);
        }
        let Some(info) = self.builder.functions.get(stdlib::GEN_ID).cloned() else {
            self.builder.error(CompileError::UnknownFunction {
                name: stdlib::GEN_ID.to_string(),
            });
            return self.free();
        };

        let ix = self.builder.inserts.len();
        let record = self.builder.new_reference(self.context, Owner::Insert(ix));
        let call = self.builder.calls.len();
        self.builder.calls.push(CallItem {
            context: self.context,
            info,
            args: attributes.iter().flat_map(|(a, v)| [a.clone(), v.clone()]).collect(),
            output: Some(record),
        });
        self.builder.inserts.push(InsertItem {
            record,
            attributes,
        });
        let items = &mut self.builder.context_mut(self.context).items;
        items.calls.push(call);
        items.inserts.push(ix);
        record
    }

    /// Add an attribute to a record, either one being created here or an
    /// existing one found by this block.
    pub fn add(&mut self, record: Reference, attribute: &str, value: impl Into<Value>) {
        if !self.is_root() {
            self.builder.error(CompileError::AddInSubBlock);
            return;
        }
        let value = value.into();
        self.builder.register(self.context, record);
        self.builder.register_value(self.context, &value);
        match self.builder.owner(record) {
            // The identity of a created record comes from the attributes it
            // was created with; added ones do not change it.
            Owner::Insert(ix) => {
                self.builder.inserts[ix].attributes.push((attribute.into(), value));
            }
            Owner::Record(_) => {
                let ix = self.builder.inserts.len();
                self.builder.inserts.push(InsertItem {
                    record,
                    attributes: vec![(attribute.into(), value)],
                });
                self.builder.context_mut(self.context).items.inserts.push(ix);
            }
            Owner::Call | Owner::Aggregate | Owner::Free => {
                self.builder.error(CompileError::NotARecord { reference: record.id() });
            }
        }
    }

    /// Require `a` and `b` to be the same value.
    pub fn eq(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.builder.equality(self.context, a.into(), b.into());
    }

    /// Keep rows for which `body` matches nothing.
    pub fn not(&mut self, body: impl FnOnce(&mut Flow<'_>)) {
        let context = self.builder.new_context(self.context, ScopeKind::Not);
        body(&mut Flow::new(self.builder, context));
        self.builder.context_mut(self.context).items.nots.push(context);
    }

    /// Results of the first branch, in declaration order, that matches.
    pub fn choose(&mut self, body: impl FnOnce(&mut Branches<'_>)) -> Vec<Reference> {
        self.branch_set(BranchMode::Choose, body)
    }

    /// Results of every branch that matches.
    pub fn union(&mut self, body: impl FnOnce(&mut Branches<'_>)) -> Vec<Reference> {
        self.branch_set(BranchMode::Union, body)
    }

    fn branch_set(&mut self, mode: BranchMode, body: impl FnOnce(&mut Branches<'_>)) -> Vec<Reference> {
        let mut branches = Branches {
            builder: self.builder,
            parent: self.context,
            branches: Vec::new(),
            results: None,
        };
        body(&mut branches);
        let Branches { branches, results, .. } = branches;
        let results = results.unwrap_or_default();
        if branches.is_empty() {
            return results;
        }
        let ix = self.builder.branch_sets.len();
        self.builder.branch_sets.push(BranchSetItem {
            mode,
            branches,
            results: results.clone(),
        });
        self.builder.context_mut(self.context).items.branch_sets.push(ix);
        results
    }

    /// Start an aggregate over distinct tuples of `projection`.
    pub fn gather(&mut self, projection: &[Reference]) -> Gather<'_, 'b> {
        Gather {
            flow: self,
            projection: projection.to_vec(),
            group: Vec::new(),
        }
    }

    fn function(&mut self, name: &str, args: &[Value]) -> Option<FunctionInfo> {
        let Some(info) = self.builder.functions.get(name).cloned() else {
            self.builder.error(CompileError::UnknownFunction { name: name.to_string() });
            return None;
        };
        if let Arity::Fixed(expected) = info.arity {
            if expected != args.len() {
                self.builder.error(CompileError::FunctionArity {
                    name: name.to_string(),
                    expected,
                    actual: args.len(),
                });
                return None;
            }
        }
        Some(info)
    }

    fn push_call(&mut self, info: FunctionInfo, args: Vec<Value>, output: Option<Reference>) {
        for arg in &args {
            self.builder.register_value(self.context, arg);
        }
        let ix = self.builder.calls.len();
        self.builder.calls.push(CallItem {
            context: self.context,
            info,
            args,
            output,
        });
        self.builder.context_mut(self.context).items.calls.push(ix);
    }

    /// Apply the function `name` and return its result.
    pub fn call<V: Into<Value>>(&mut self, name: &str, args: impl IntoIterator<Item = V>) -> Reference {
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        let Some(info) = self.function(name, &args) else {
            return self.free();
        };
        if info.is_filter() {
            self.builder.error(CompileError::FilterHasNoValue { name: name.to_string() });
            return self.free();
        }
        let output = self.builder.new_reference(self.context, Owner::Call);
        self.push_call(info, args, Some(output));
        output
    }

    /// Apply the function `name`, keeping only rows it accepts.
    pub fn filter<V: Into<Value>>(&mut self, name: &str, args: impl IntoIterator<Item = V>) {
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        if let Some(info) = self.function(name, &args) {
            self.push_call(info, args, None);
        }
    }

    fn binary(&mut self, name: &str, a: impl Into<Value>, b: impl Into<Value>) -> Reference {
        self.call(name, [a.into(), b.into()])
    }

    fn compare(&mut self, name: &str, a: impl Into<Value>, b: impl Into<Value>) {
        self.filter(name, [a.into(), b.into()]);
    }

    /// `math/+`.
    pub fn plus(&mut self, a: impl Into<Value>, b: impl Into<Value>) -> Reference {
        self.binary("math/+", a, b)
    }

    /// `math/-`.
    pub fn minus(&mut self, a: impl Into<Value>, b: impl Into<Value>) -> Reference {
        self.binary("math/-", a, b)
    }

    /// `math/*`.
    pub fn times(&mut self, a: impl Into<Value>, b: impl Into<Value>) -> Reference {
        self.binary("math/*", a, b)
    }

    /// `math//`.
    pub fn divide(&mut self, a: impl Into<Value>, b: impl Into<Value>) -> Reference {
        self.binary("math//", a, b)
    }

    /// Keep rows where `a > b`.
    pub fn gt(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.compare("compare/>", a, b);
    }

    /// Keep rows where `a >= b`.
    pub fn gte(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.compare("compare/>=", a, b);
    }

    /// Keep rows where `a < b`.
    pub fn lt(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.compare("compare/<", a, b);
    }

    /// Keep rows where `a <= b`.
    pub fn lte(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.compare("compare/<=", a, b);
    }

    /// Keep rows where `a` and `b` differ.
    pub fn neq(&mut self, a: impl Into<Value>, b: impl Into<Value>) {
        self.compare("compare/!=", a, b);
    }

    /// String concatenation of every argument.
    pub fn concat<V: Into<Value>>(&mut self, parts: impl IntoIterator<Item = V>) -> Reference {
        self.call("string/concat", parts)
    }
}

/// Branches of a choose or union under construction.
pub struct Branches<'f> {
    builder: &'f mut Builder,
    parent: ContextId,
    branches: Vec<ContextId>,
    results: Option<Vec<Reference>>,
}

impl Branches<'_> {
    /// Add a branch. Every branch must return the same number of values.
    pub fn branch<R: IntoResults>(&mut self, body: impl FnOnce(&mut Flow<'_>) -> R) -> &mut Self {
        let context = self.builder.new_context(self.parent, ScopeKind::Branch);
        let values = body(&mut Flow::new(self.builder, context)).into_results();
        let results = match &self.results {
            Some(results) => results.clone(),
            None => {
                let results: Vec<Reference> = values
                    .iter()
                    .map(|_| self.builder.new_reference(self.parent, Owner::Free))
                    .collect();
                self.results = Some(results.clone());
                results
            }
        };
        if values.len() == results.len() {
            for (value, result) in values.into_iter().zip(results) {
                self.builder.register(context, result);
                self.builder.register_value(context, &value);
                self.builder.push_move(context, value, result);
            }
        } else {
            self.builder.error(CompileError::BranchArity {
                branch: self.branches.len(),
                expected: results.len(),
                actual: values.len(),
            });
        }
        self.branches.push(context);
        self
    }
}

/// An aggregate under construction. Borrows the flow it aggregates in.
pub struct Gather<'f, 'b> {
    flow: &'f mut Flow<'b>,
    projection: Vec<Reference>,
    group: Vec<Reference>,
}

impl Gather<'_, '_> {
    /// Aggregate separately per distinct tuple of `group`.
    #[must_use]
    pub fn per(mut self, group: &[Reference]) -> Self {
        self.group.extend_from_slice(group);
        self
    }

    /// Number of distinct projection tuples in the group.
    pub fn count(self) -> Reference {
        self.finish(AggregateSpec::Count)
    }

    /// Sum of `value` over distinct projection tuples in the group.
    pub fn sum(self, value: impl Into<Value>) -> Reference {
        self.finish(AggregateSpec::Sum(value.into()))
    }

    /// Position of each projection tuple within its group, starting at 1.
    pub fn sort(self, directions: &[Direction]) -> Reference {
        self.finish(AggregateSpec::Sort(directions.to_vec()))
    }

    fn finish(self, spec: AggregateSpec) -> Reference {
        let Self { flow, projection, group } = self;
        let context = flow.context;
        let builder = &mut *flow.builder;
        for reference in projection.iter().chain(&group) {
            builder.register(context, *reference);
        }
        if let AggregateSpec::Sum(value) = &spec {
            builder.register_value(context, value);
        }
        let output = builder.new_reference(context, Owner::Aggregate);
        let ix = builder.aggregates.len();
        builder.aggregates.push(AggregateItem {
            context,
            spec,
            projection,
            group,
            output,
        });
        builder.context_mut(context).items.aggregates.push(ix);
        output
    }
}

/// Values a branch body returns.
pub trait IntoResults {
    /// The returned values, in order.
    fn into_results(self) -> Vec<Value>;
}

impl IntoResults for () {
    fn into_results(self) -> Vec<Value> {
        Vec::new()
    }
}

impl IntoResults for Value {
    fn into_results(self) -> Vec<Value> {
        vec![self]
    }
}

impl IntoResults for Reference {
    fn into_results(self) -> Vec<Value> {
        vec![self.into()]
    }
}

impl IntoResults for &str {
    fn into_results(self) -> Vec<Value> {
        vec![self.into()]
    }
}

impl IntoResults for String {
    fn into_results(self) -> Vec<Value> {
        vec![self.into()]
    }
}

impl IntoResults for i32 {
    fn into_results(self) -> Vec<Value> {
        vec![self.into()]
    }
}

impl IntoResults for f64 {
    fn into_results(self) -> Vec<Value> {
        vec![self.into()]
    }
}

impl IntoResults for Vec<Value> {
    fn into_results(self) -> Vec<Value> {
        self
    }
}

impl IntoResults for Vec<Reference> {
    fn into_results(self) -> Vec<Value> {
        self.into_iter().map(Value::from).collect()
    }
}

impl<const N: usize> IntoResults for [Value; N] {
    fn into_results(self) -> Vec<Value> {
        self.into()
    }
}

impl<const N: usize> IntoResults for [Reference; N] {
    fn into_results(self) -> Vec<Value> {
        self.into_iter().map(Value::from).collect()
    }
}
