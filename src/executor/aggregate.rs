//! Grouping aggregation.
//!
//! `Aggregator` folds tuples into per-group running state one at a time;
//! `AggregateExecutor` drains its child into an `Aggregator` when opened and
//! then serves one tuple per group.
//!
//! Output columns are `[group column, "<fn>(<field>)"]` when grouping and
//! `["<fn>(<field>)"]` otherwise. Aggregate values are always integers.
//! Groups come out in hash-map order, which callers must not rely on.

use crate::access::{ColumnInfo, DataType, Schema, Tuple, Value};
use crate::error::{DbError, Result};
use crate::executor::{Cursor, Executor, Operator, ValuesExecutor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    /// Truncating integer average, recomputed on every merge
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    /// Parse a function name, ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            _ => Err(DbError::InvalidArgument(format!(
                "unknown aggregate function: {}",
                name
            ))),
        }
    }

    fn identity(&self) -> i32 {
        match self {
            AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::Avg => 0,
            AggregateFunction::Min => i32::MAX,
            AggregateFunction::Max => i32::MIN,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bucket a tuple is aggregated into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Grouped(Value),
    Ungrouped,
}

/// Running aggregate for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AggregateState {
    /// Current result for the group
    value: i32,
    count: i64,
    sum: i64,
}

impl AggregateState {
    fn new(function: AggregateFunction) -> Self {
        Self {
            value: function.identity(),
            count: 0,
            sum: 0,
        }
    }

    /// Fold one value in. On error the state is left untouched.
    fn merge(&mut self, function: AggregateFunction, field: &Value) -> Result<()> {
        let count = self.count + 1;
        if function == AggregateFunction::Count {
            self.value = i32::try_from(count)
                .map_err(|_| DbError::Db("count overflows a 32-bit integer".to_string()))?;
            self.count = count;
            return Ok(());
        }

        let v = field.as_i32().ok_or_else(|| {
            DbError::InvalidArgument(format!("cannot {} a {} value", function, field.data_type()))
        })?;
        let sum = self.sum + i64::from(v);
        self.value = match function {
            AggregateFunction::Sum => self
                .value
                .checked_add(v)
                .ok_or_else(|| DbError::Db("sum overflows a 32-bit integer".to_string()))?,
            // The average of i32 values always fits in an i32
            AggregateFunction::Avg => (sum / count) as i32,
            AggregateFunction::Min => self.value.min(v),
            AggregateFunction::Max => self.value.max(v),
            AggregateFunction::Count => self.value,
        };
        self.count = count;
        self.sum = sum;
        Ok(())
    }
}

/// Computes one aggregate over a stream of tuples, optionally grouped by
/// one field.
#[derive(Debug, Clone)]
pub struct Aggregator {
    group_by: Option<(usize, DataType)>,
    agg_field: usize,
    agg_type: DataType,
    function: AggregateFunction,
    groups: HashMap<GroupKey, AggregateState>,
    /// Fixed by the first merged tuple
    schema: Option<Arc<Schema>>,
}

impl Aggregator {
    /// String fields only support `Count`.
    pub fn new(
        group_by: Option<(usize, DataType)>,
        agg_field: usize,
        agg_type: DataType,
        function: AggregateFunction,
    ) -> Result<Self> {
        if agg_type == DataType::Char && function != AggregateFunction::Count {
            return Err(DbError::InvalidArgument(format!(
                "{} is not supported on {} fields",
                function, agg_type
            )));
        }

        Ok(Self {
            group_by,
            agg_field,
            agg_type,
            function,
            groups: HashMap::new(),
            schema: None,
        })
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Output schema for tuples shaped like `input`.
    pub fn describe(&self, input: &Schema) -> Result<Schema> {
        let agg_name = format!("{}({})", self.function, input.field_name(self.agg_field)?);
        let agg_column = ColumnInfo::new(agg_name, DataType::Int32);

        Ok(match self.group_by {
            Some((field, data_type)) => Schema::new(vec![
                ColumnInfo::new(input.field_name(field)?, data_type),
                agg_column,
            ]),
            None => Schema::new(vec![agg_column]),
        })
    }

    /// Fold one input tuple into its group.
    pub fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let key = match self.group_by {
            Some((field, data_type)) => {
                let value = tuple.value(field)?;
                if value.data_type() != data_type {
                    return Err(self.type_error(field, data_type, value));
                }
                GroupKey::Grouped(value.clone())
            }
            None => GroupKey::Ungrouped,
        };

        let field = tuple.value(self.agg_field)?;
        if field.data_type() != self.agg_type {
            return Err(self.type_error(self.agg_field, self.agg_type, field));
        }

        if self.schema.is_none() {
            self.schema = Some(Arc::new(self.describe(tuple.schema())?));
        }

        let function = self.function;
        self.groups
            .entry(key)
            .or_insert_with(|| AggregateState::new(function))
            .merge(function, field)
    }

    /// Current aggregate value of one group.
    pub fn value_of(&self, key: &GroupKey) -> Option<i32> {
        self.groups.get(key).map(|state| state.value)
    }

    /// One tuple per group, as an unopened executor.
    pub fn iterator(&self) -> Result<ValuesExecutor> {
        let schema = match &self.schema {
            Some(schema) => Arc::clone(schema),
            None => Arc::new(Schema::from_types(&self.output_types())),
        };

        let tuples = self
            .groups
            .iter()
            .map(|(key, state)| {
                let aggregate = Value::Int32(state.value);
                let values = match key {
                    GroupKey::Grouped(group) => vec![group.clone(), aggregate],
                    GroupKey::Ungrouped => vec![aggregate],
                };
                Tuple::new(Arc::clone(&schema), values)
            })
            .collect::<Result<Vec<_>>>()?;

        ValuesExecutor::new(schema, tuples)
    }

    fn output_types(&self) -> Vec<DataType> {
        match self.group_by {
            Some((_, data_type)) => vec![data_type, DataType::Int32],
            None => vec![DataType::Int32],
        }
    }

    fn type_error(&self, field: usize, expected: DataType, actual: &Value) -> DbError {
        DbError::SchemaMismatch {
            expected: format!("field {} of type {}", field, expected),
            actual: actual.data_type().to_string(),
        }
    }
}

/// Executor that aggregates its child's output.
///
/// The child is fully consumed during `open`; `rewind` replays the computed
/// groups without reading the child again.
pub struct AggregateExecutor {
    child: Box<dyn Executor>,
    agg_field: usize,
    group_by: Option<usize>,
    function: AggregateFunction,
    schema: Arc<Schema>,
    results: Option<ValuesExecutor>,
    cursor: Cursor,
}

impl AggregateExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        agg_field: usize,
        group_by: Option<usize>,
        function: AggregateFunction,
    ) -> Result<Self> {
        let aggregator = Self::aggregator_for(child.schema(), agg_field, group_by, function)?;
        let schema = Arc::new(aggregator.describe(child.schema())?);

        Ok(Self {
            child,
            agg_field,
            group_by,
            function,
            schema,
            results: None,
            cursor: Cursor::new(),
        })
    }

    fn aggregator_for(
        input: &Schema,
        agg_field: usize,
        group_by: Option<usize>,
        function: AggregateFunction,
    ) -> Result<Aggregator> {
        let group_by = group_by
            .map(|field| input.field_type(field).map(|data_type| (field, data_type)))
            .transpose()?;
        Aggregator::new(group_by, agg_field, input.field_type(agg_field)?, function)
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    /// Name of the grouping column in the child's schema, if grouping.
    pub fn group_field_name(&self) -> Option<&str> {
        self.group_by
            .and_then(|field| self.child.schema().field_name(field).ok())
    }

    pub fn aggregate_field_name(&self) -> Result<&str> {
        self.child.schema().field_name(self.agg_field)
    }
}

impl Operator for AggregateExecutor {
    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn open_operator(&mut self) -> Result<()> {
        self.child.open()?;

        let mut aggregator = Self::aggregator_for(
            self.child.schema(),
            self.agg_field,
            self.group_by,
            self.function,
        )?;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            aggregator.merge_tuple_into_group(&tuple)?;
        }

        let mut results = aggregator.iterator()?;
        results.open()?;
        self.results = Some(results);
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let results = self
            .results
            .as_mut()
            .ok_or(DbError::IllegalState("aggregate results are not computed"))?;
        if !results.has_next()? {
            return Ok(None);
        }
        let tuple = results.next()?;
        Tuple::new(Arc::clone(&self.schema), tuple.into_values()).map(Some)
    }

    fn rewind_operator(&mut self) -> Result<()> {
        match self.results.as_mut() {
            Some(results) => results.rewind(),
            None => Err(DbError::IllegalState("aggregate results are not computed")),
        }
    }

    fn close_operator(&mut self) {
        if let Some(mut results) = self.results.take() {
            results.close();
        }
        self.child.close();
    }
}
