use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Largest value list accepted by an `In` filter.
pub const MAX_IN_VALUES: usize = 30;

/// Comparison applied by a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Field equals the value
    Eq,
    /// Array field contains the value
    ArrayContains,
    /// Field equals one of the values
    In,
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterOperator::Eq => "eq",
            FilterOperator::ArrayContains => "array_contains",
            FilterOperator::In => "in",
        };
        write!(f, "{}", s)
    }
}

/// A condition on one top-level field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.operator {
            FilterOperator::Eq => actual == &self.value,
            FilterOperator::ArrayContains => actual
                .as_array()
                .map(|items| items.contains(&self.value))
                .unwrap_or(false),
            FilterOperator::In => self
                .value
                .as_array()
                .map(|candidates| candidates.contains(actual))
                .unwrap_or(false),
        }
    }
}

/// Conjunction of filters over one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filter(Filter {
            field: field.to_string(),
            operator: FilterOperator::Eq,
            value: value.into(),
        })
    }

    pub fn array_contains<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.filter(Filter {
            field: field.to_string(),
            operator: FilterOperator::ArrayContains,
            value: value.into(),
        })
    }

    pub fn in_values<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        self.filter(Filter {
            field: field.to_string(),
            operator: FilterOperator::In,
            value: Value::Array(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.filters.iter().all(|f| f.matches(fields))
    }

    /// Reject queries no backend would accept.
    pub fn validate(&self) -> Result<(), StoreError> {
        for filter in &self.filters {
            if filter.operator == FilterOperator::In {
                match filter.value.as_array() {
                    Some(values) if values.is_empty() => {
                        return Err(StoreError::InvalidQuery(format!(
                            "'in' filter on '{}' needs at least one value",
                            filter.field
                        )))
                    }
                    Some(values) if values.len() > MAX_IN_VALUES => {
                        return Err(StoreError::InvalidQuery(format!(
                            "'in' filter on '{}' accepts at most {} values, got {}",
                            filter.field,
                            MAX_IN_VALUES,
                            values.len()
                        )))
                    }
                    Some(_) => {}
                    None => {
                        return Err(StoreError::InvalidQuery(format!(
                            "'in' filter on '{}' needs an array value",
                            filter.field
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn eq_and_array_contains() {
        let doc = fields(json!({
            "owner": "alice@x.com",
            "sharedWithEmails": ["bob@x.com", "carol@x.com"]
        }));

        assert!(Query::new().eq("owner", "alice@x.com").matches(&doc));
        assert!(!Query::new().eq("owner", "bob@x.com").matches(&doc));
        assert!(Query::new()
            .array_contains("sharedWithEmails", "carol@x.com")
            .matches(&doc));
        assert!(!Query::new()
            .array_contains("sharedWithEmails", "alice@x.com")
            .matches(&doc));
    }

    #[test]
    fn missing_field_never_matches() {
        let doc = fields(json!({ "title": "Buy milk" }));
        assert!(!Query::new().eq("listId", "l1").matches(&doc));
        assert!(Query::new().matches(&doc));
    }

    #[test]
    fn in_filter_limits() {
        let doc = fields(json!({ "listId": "l2" }));
        let query = Query::new().in_values("listId", vec!["l1", "l2"]);
        assert!(query.matches(&doc));
        assert!(query.validate().is_ok());

        let empty: Vec<&str> = Vec::new();
        assert!(Query::new().in_values("listId", empty).validate().is_err());

        let too_many: Vec<String> = (0..=MAX_IN_VALUES).map(|i| i.to_string()).collect();
        assert!(matches!(
            Query::new().in_values("listId", too_many).validate(),
            Err(StoreError::InvalidQuery(_))
        ));
    }
}
