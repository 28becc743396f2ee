//! Request bodies for the tabular record API: field projection, `where`
//! clauses, grouped conditions, ordering and paging.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::task::Priority;

pub const TASK_FIELDS: [&str; 9] = [
    "Id",
    "title",
    "description",
    "categoryId",
    "priority",
    "dueDate",
    "completed",
    "createdAt",
    "order",
];

pub const CATEGORY_FIELDS: [&str; 4] = ["Id", "name", "color", "order"];

pub const PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    EqualTo,
    LessThan,
    GreaterThan,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Logic {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub field: FieldName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldName {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WhereClause {
    pub field_name: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field_name: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubGroup {
    pub conditions: Vec<Condition>,
    pub operator: Logic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereGroup {
    pub operator: Logic,
    pub sub_groups: Vec<SubGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field_name: String,
    pub sorttype: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagingInfo {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub fields: Vec<FieldSpec>,
    #[serde(rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub where_groups: Vec<WhereGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging_info: Option<PagingInfo>,
}

impl Query {
    pub fn select(fields: &[&str]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|name| FieldSpec {
                    field: FieldName {
                        name: (*name).to_string(),
                    },
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn equal_to(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.where_clauses.push(WhereClause {
            field_name: field.to_string(),
            operator: Operator::EqualTo,
            values: vec![value.into()],
        });
        self
    }

    /// Adds one group whose conditions are joined with `logic`.
    pub fn group(mut self, logic: Logic, conditions: Vec<Condition>) -> Self {
        self.where_groups.push(WhereGroup {
            operator: logic,
            sub_groups: vec![SubGroup {
                conditions,
                operator: logic,
            }],
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field_name: field.to_string(),
            sorttype: direction,
        });
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.paging_info = Some(PagingInfo { limit, offset });
        self
    }
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field_name: field.to_string(),
            operator,
            values: vec![value.into()],
        }
    }
}

pub fn all_tasks(offset: u32) -> Query {
    Query::select(&TASK_FIELDS)
        .order_by("order", Direction::Asc)
        .page(PAGE_LIMIT, offset)
}

pub fn tasks_by_category(category_id: u64) -> Query {
    Query::select(&TASK_FIELDS)
        .equal_to("categoryId", category_id)
        .order_by("order", Direction::Asc)
}

pub fn tasks_by_priority(priority: Priority) -> Query {
    Query::select(&TASK_FIELDS)
        .equal_to("priority", priority.as_str())
        .order_by("order", Direction::Asc)
}

pub fn completed_tasks() -> Query {
    Query::select(&TASK_FIELDS)
        .equal_to("completed", true)
        .order_by("order", Direction::Asc)
}

pub fn overdue_tasks(now: DateTime<Utc>) -> Query {
    Query::select(&TASK_FIELDS)
        .group(
            Logic::And,
            vec![
                Condition::new(
                    "dueDate",
                    Operator::LessThan,
                    now.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
                Condition::new("completed", Operator::EqualTo, false),
            ],
        )
        .order_by("dueDate", Direction::Asc)
}

pub fn search_tasks(text: &str) -> Query {
    let needle = text.trim();
    Query::select(&TASK_FIELDS)
        .group(
            Logic::Or,
            vec![
                Condition::new("title", Operator::Contains, needle),
                Condition::new("description", Operator::Contains, needle),
            ],
        )
        .order_by("order", Direction::Asc)
}

pub fn all_categories() -> Query {
    Query::select(&CATEGORY_FIELDS).order_by("order", Direction::Asc)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{all_tasks, overdue_tasks, search_tasks, tasks_by_category};

    #[test]
    fn list_query_projects_orders_and_pages() {
        let body = serde_json::to_value(all_tasks(0)).unwrap();
        assert_eq!(body["fields"][0], json!({"field": {"Name": "Id"}}));
        assert_eq!(body["fields"].as_array().map(Vec::len), Some(9));
        assert_eq!(body["orderBy"], json!([{"fieldName": "order", "sorttype": "ASC"}]));
        assert_eq!(body["pagingInfo"], json!({"limit": 1000, "offset": 0}));
        assert!(body.get("where").is_none());
        assert!(body.get("whereGroups").is_none());
    }

    #[test]
    fn equality_filter_uses_where_clause() {
        let body = serde_json::to_value(tasks_by_category(3)).unwrap();
        assert_eq!(
            body["where"],
            json!([{"FieldName": "categoryId", "Operator": "EqualTo", "Values": [3]}])
        );
    }

    #[test]
    fn overdue_is_an_and_group_sorted_by_due_date() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let body = serde_json::to_value(overdue_tasks(now)).unwrap();
        let group = &body["whereGroups"][0];
        assert_eq!(group["operator"], "AND");
        let conditions = &group["subGroups"][0]["conditions"];
        assert_eq!(
            conditions[0],
            json!({"fieldName": "dueDate", "operator": "LessThan", "values": ["2026-02-16T05:00:00.000Z"]})
        );
        assert_eq!(conditions[1]["values"], json!([false]));
        assert_eq!(body["orderBy"][0]["fieldName"], "dueDate");
    }

    #[test]
    fn search_is_an_or_of_contains() {
        let body = serde_json::to_value(search_tasks("  milk ")).unwrap();
        let sub = &body["whereGroups"][0]["subGroups"][0];
        assert_eq!(sub["operator"], "OR");
        assert_eq!(sub["conditions"][0]["operator"], "Contains");
        assert_eq!(sub["conditions"][1]["values"], json!(["milk"]));
    }
}
