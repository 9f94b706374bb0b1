//! FILENAME: core/perspective-engine/src/condition.rs
//! Translation of node filters into backend conditions.
//!
//! Relational sources get a serializable condition tree that the external
//! query builder turns into SQL. Document sources get a Mongo filter document.
//! A load request only ever carries one of the two.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use crate::definition::{FilterOperator, PerspectiveFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "conditionType", rename_all = "camelCase")]
pub enum SqlCondition {
    And {
        conditions: Vec<SqlCondition>,
    },
    #[serde(rename_all = "camelCase")]
    Binary {
        operator: String,
        column_name: String,
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    Like {
        column_name: String,
        pattern: String,
    },
    #[serde(rename_all = "camelCase")]
    IsNull {
        column_name: String,
    },
    Not {
        condition: Box<SqlCondition>,
    },
}

/// Combines all filters with AND. Returns `None` when there is nothing to filter.
pub fn sql_condition(filters: &[PerspectiveFilter]) -> Option<SqlCondition> {
    let mut conditions: Vec<SqlCondition> = filters.iter().map(sql_filter_condition).collect();
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(SqlCondition::And { conditions }),
    }
}

fn sql_filter_condition(filter: &PerspectiveFilter) -> SqlCondition {
    let column_name = filter.column_name.clone();
    let binary = |operator: &str| SqlCondition::Binary {
        operator: operator.to_string(),
        column_name: filter.column_name.clone(),
        value: filter.value.clone(),
    };
    match filter.operator {
        FilterOperator::Equals => binary("="),
        FilterOperator::NotEquals => binary("<>"),
        FilterOperator::Less => binary("<"),
        FilterOperator::LessOrEqual => binary("<="),
        FilterOperator::Greater => binary(">"),
        FilterOperator::GreaterOrEqual => binary(">="),
        FilterOperator::Contains => SqlCondition::Like {
            column_name,
            pattern: format!("%{}%", value_text(&filter.value)),
        },
        FilterOperator::StartsWith => SqlCondition::Like {
            column_name,
            pattern: format!("{}%", value_text(&filter.value)),
        },
        FilterOperator::IsNull => SqlCondition::IsNull { column_name },
        FilterOperator::IsNotNull => SqlCondition::Not {
            condition: Box::new(SqlCondition::IsNull { column_name }),
        },
    }
}

/// Builds a `{"$and": [...]}` filter document. Returns `None` when there is nothing to filter.
pub fn mongo_condition(filters: &[PerspectiveFilter]) -> Option<Value> {
    if filters.is_empty() {
        return None;
    }
    let conditions: Vec<Value> = filters.iter().map(mongo_filter_condition).collect();
    Some(json!({ "$and": conditions }))
}

fn mongo_filter_condition(filter: &PerspectiveFilter) -> Value {
    let test = match filter.operator {
        FilterOperator::Equals => json!({ "$eq": filter.value }),
        FilterOperator::NotEquals => json!({ "$ne": filter.value }),
        FilterOperator::Less => json!({ "$lt": filter.value }),
        FilterOperator::LessOrEqual => json!({ "$lte": filter.value }),
        FilterOperator::Greater => json!({ "$gt": filter.value }),
        FilterOperator::GreaterOrEqual => json!({ "$gte": filter.value }),
        FilterOperator::Contains => json!({
            "$regex": escape_regex(&value_text(&filter.value)),
            "$options": "i",
        }),
        FilterOperator::StartsWith => json!({
            "$regex": format!("^{}", escape_regex(&value_text(&filter.value))),
            "$options": "i",
        }),
        FilterOperator::IsNull => json!({ "$eq": Value::Null }),
        FilterOperator::IsNotNull => json!({ "$exists": true, "$ne": Value::Null }),
    };
    let mut map = Map::new();
    map.insert(filter.column_name.clone(), test);
    Value::Object(map)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_regex(text: &str) -> String {
    let mut res = String::with_capacity(text.len());
    for ch in text.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            res.push('\\');
        }
        res.push(ch);
    }
    res
}
