//! Backend over a hosted tabular record API.
//!
//! Every table exposes the same four record endpoints under
//! `{base}/tables/{table}/records`. Responses share one envelope: a
//! `success` flag, an optional `message`, and either `data` (query and
//! fetch) or per-record `results` (create, update, delete).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use super::query::{self, PAGE_LIMIT, Query};
use super::{CategoryGateway, OrderClock, TaskGateway};
use crate::error::{GatewayError, TaskError, TaskResult};
use crate::task::{
    Category, CategoryDraft, CategoryPatch, DEFAULT_CATEGORY_COLOR, Priority, Task, TaskDraft,
    TaskPatch,
};

const PROJECT_HEADER: &str = "X-Project-Id";
const KEY_HEADER: &str = "X-Public-Key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub project_id: String,
    pub public_key: String,
    pub timeout: Duration,
    pub tasks_table: String,
    pub categories_table: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            project_id: String::new(),
            public_key: String::new(),
            timeout: Duration::from_secs(30),
            tasks_table: "Tasks".to_string(),
            categories_table: "Categories".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default = "Vec::new")]
    results: Vec<RecordResult<T>>,
}

#[derive(Debug, Deserialize)]
struct RecordResult<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn ensure_success(self) -> TaskResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(rejected(self.message, "request failed"))
        }
    }

    fn first_result(self) -> TaskResult<Option<T>> {
        match self.results.into_iter().next() {
            Some(result) if result.success => Ok(result.data),
            Some(result) => Err(rejected(result.message, "record operation failed")),
            None => Ok(None),
        }
    }
}

fn rejected(message: Option<String>, fallback: &str) -> TaskError {
    GatewayError::Rejected(message.unwrap_or_else(|| fallback.to_string())).into()
}

/// One table on the record API, bound to the credentials and entity name
/// used when reporting missing records.
#[derive(Debug, Clone)]
struct TableClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    public_key: String,
    table: String,
    entity: &'static str,
}

impl TableClient {
    fn new(settings: &RemoteSettings, table: &str, entity: &'static str) -> TaskResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project_id: settings.project_id.clone(),
            public_key: settings.public_key.clone(),
            table: table.to_string(),
            entity,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/tables/{}/records{suffix}", self.base_url, self.table)
    }

    fn not_found(&self, id: u64) -> TaskError {
        TaskError::NotFound {
            entity: self.entity,
            id,
        }
    }

    fn json_body(&self, request: RequestBuilder, body: &impl Serialize) -> TaskResult<RequestBuilder> {
        let bytes = serde_json::to_vec(body)?;
        Ok(request.header(CONTENT_TYPE, "application/json").body(bytes))
    }

    /// Sends the request and decodes the envelope. HTTP 404 maps to
    /// `NotFound` when the call addressed a single record.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        record_id: Option<u64>,
    ) -> TaskResult<Envelope<T>> {
        let response = request
            .header(PROJECT_HEADER, &self.project_id)
            .header(KEY_HEADER, &self.public_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::NOT_FOUND
            && let Some(id) = record_id
        {
            return Err(self.not_found(id));
        }
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            warn!(table = %self.table, %status, "record api returned error status");
            return Err(GatewayError::Rejected(format!("HTTP {status}: {}", text.trim())).into());
        }
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        envelope.ensure_success()
    }

    #[instrument(skip(self, query), fields(table = %self.table))]
    async fn query<T: DeserializeOwned>(&self, query: &Query) -> TaskResult<Vec<T>> {
        let request = self.json_body(self.http.post(self.url("/query")), query)?;
        let envelope: Envelope<Vec<T>> = self.send(request, None).await?;
        let rows = envelope.data.unwrap_or_default();
        debug!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    /// Pages through the whole table with `PAGE_LIMIT`-sized requests.
    async fn query_all<T: DeserializeOwned>(&self, build: impl Fn(u32) -> Query) -> TaskResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page: Vec<T> = self.query(&build(offset)).await?;
            let done = page.len() < PAGE_LIMIT as usize;
            rows.extend(page);
            if done {
                return Ok(rows);
            }
            offset += PAGE_LIMIT;
        }
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn fetch<T: DeserializeOwned>(&self, id: u64) -> TaskResult<T> {
        let request = self.http.get(self.url(&format!("/{id}")));
        let envelope: Envelope<T> = self.send(request, Some(id)).await?;
        envelope.data.ok_or_else(|| self.not_found(id))
    }

    async fn create<T: DeserializeOwned>(&self, record: &impl Serialize) -> TaskResult<T> {
        let body = json!({ "records": [record] });
        let request = self.json_body(self.http.post(self.url("")), &body)?;
        let envelope: Envelope<T> = self.send(request, None).await?;
        envelope
            .first_result()?
            .ok_or_else(|| rejected(None, "create returned no record"))
    }

    async fn update<T: DeserializeOwned>(&self, id: u64, fields: Map<String, Value>) -> TaskResult<T> {
        let mut record = fields;
        record.insert("Id".to_string(), Value::from(id));
        let body = json!({ "records": [record] });
        let request = self.json_body(self.http.put(self.url("")), &body)?;
        let envelope: Envelope<T> = self.send(request, Some(id)).await?;
        envelope.first_result()?.ok_or_else(|| self.not_found(id))
    }

    async fn delete(&self, id: u64) -> TaskResult<()> {
        let body = json!({ "RecordIds": [id] });
        let request = self.json_body(self.http.delete(self.url("")), &body)?;
        let envelope: Envelope<Value> = self.send(request, Some(id)).await?;
        match envelope.results.into_iter().next() {
            Some(result) if result.success => Ok(()),
            Some(result) => Err(rejected(result.message, "delete failed")),
            None => Err(rejected(None, "delete returned no result")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category_id: u64,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    order: i64,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Task {
            id: record.id,
            title: record.title,
            description: record.description.unwrap_or_default(),
            category_id: record.category_id,
            priority: record.priority.unwrap_or_default(),
            due_date: record.due_date,
            completed: record.completed,
            created_at: record.created_at.unwrap_or_default(),
            order: record.order,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTaskRecord<'a> {
    title: &'a str,
    description: &'a str,
    category_id: u64,
    priority: Priority,
    due_date: Option<DateTime<Utc>>,
    completed: bool,
    created_at: DateTime<Utc>,
    order: i64,
}

fn patch_fields(patch: TaskPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(title) = patch.title {
        fields.insert("title".to_string(), Value::from(title));
    }
    if let Some(description) = patch.description {
        fields.insert("description".to_string(), Value::from(description));
    }
    if let Some(category_id) = patch.category_id {
        fields.insert("categoryId".to_string(), Value::from(category_id));
    }
    if let Some(priority) = patch.priority {
        fields.insert("priority".to_string(), Value::from(priority.as_str()));
    }
    if let Some(due_date) = patch.due_date {
        let value = due_date.map_or(Value::Null, |due| Value::from(due.to_rfc3339()));
        fields.insert("dueDate".to_string(), value);
    }
    if let Some(completed) = patch.completed {
        fields.insert("completed".to_string(), Value::from(completed));
    }
    fields
}

#[derive(Debug)]
pub struct RemoteGateway {
    client: TableClient,
    clock: OrderClock,
}

impl RemoteGateway {
    pub fn new(settings: &RemoteSettings) -> TaskResult<Self> {
        Ok(Self {
            client: TableClient::new(settings, &settings.tasks_table, "task")?,
            clock: OrderClock::default(),
        })
    }

    async fn run_query(&self, query: Query) -> TaskResult<Vec<Task>> {
        let rows: Vec<TaskRecord> = self.client.query(&query).await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }
}

impl TaskGateway for RemoteGateway {
    #[instrument(skip(self))]
    async fn list(&self) -> TaskResult<Vec<Task>> {
        let rows: Vec<TaskRecord> = self.client.query_all(query::all_tasks).await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: u64) -> TaskResult<Task> {
        let record: TaskRecord = self.client.fetch(id).await?;
        Ok(record.into())
    }

    #[instrument(skip(self, draft), fields(category = draft.category_id))]
    async fn create(&self, draft: TaskDraft) -> TaskResult<Task> {
        let now = Utc::now();
        let record = NewTaskRecord {
            title: &draft.title,
            description: &draft.description,
            category_id: draft.category_id,
            priority: draft.priority,
            due_date: draft.due_date,
            completed: false,
            created_at: now,
            order: self.clock.next(now),
        };
        let created: TaskRecord = self.client.create(&record).await?;
        info!(id = created.id, "created remote task");
        Ok(created.into())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: TaskPatch) -> TaskResult<Task> {
        // Existence check first: a missing id is `NotFound`, not a rejected write.
        self.client.fetch::<TaskRecord>(id).await?;
        let updated: TaskRecord = self.client.update(id, patch_fields(patch)).await?;
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> TaskResult<()> {
        self.client.fetch::<TaskRecord>(id).await?;
        self.client.delete(id).await?;
        info!(id, "deleted remote task");
        Ok(())
    }

    async fn by_category(&self, category_id: u64) -> TaskResult<Vec<Task>> {
        self.run_query(query::tasks_by_category(category_id)).await
    }

    async fn by_priority(&self, priority: Priority) -> TaskResult<Vec<Task>> {
        self.run_query(query::tasks_by_priority(priority)).await
    }

    async fn completed(&self) -> TaskResult<Vec<Task>> {
        self.run_query(query::completed_tasks()).await
    }

    async fn overdue(&self, now: DateTime<Utc>) -> TaskResult<Vec<Task>> {
        self.run_query(query::overdue_tasks(now)).await
    }

    async fn search(&self, text: &str) -> TaskResult<Vec<Task>> {
        if text.trim().is_empty() {
            return self.list().await;
        }
        self.run_query(query::search_tasks(text)).await
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct CategoryRecord {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    order: Option<u32>,
}

impl From<CategoryRecord> for Category {
    fn from(record: CategoryRecord) -> Self {
        Category {
            id: record.id,
            name: record.name,
            color: record
                .color
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            order: record.order.unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct RemoteCategoryGateway {
    client: TableClient,
}

impl RemoteCategoryGateway {
    pub fn new(settings: &RemoteSettings) -> TaskResult<Self> {
        Ok(Self {
            client: TableClient::new(settings, &settings.categories_table, "category")?,
        })
    }
}

impl CategoryGateway for RemoteCategoryGateway {
    #[instrument(skip(self))]
    async fn list(&self) -> TaskResult<Vec<Category>> {
        let rows: Vec<CategoryRecord> = self.client.query(&query::all_categories()).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: u64) -> TaskResult<Category> {
        let record: CategoryRecord = self.client.fetch(id).await?;
        Ok(record.into())
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create(&self, draft: CategoryDraft) -> TaskResult<Category> {
        let existing = self.list().await?;
        let body = json!({
            "name": draft.name,
            "color": draft.color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            "order": existing.len() + 1,
        });
        let created: CategoryRecord = self.client.create(&body).await?;
        Ok(created.into())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: CategoryPatch) -> TaskResult<Category> {
        let mut fields = Map::new();
        if let Some(name) = patch.name {
            fields.insert("name".to_string(), Value::from(name));
        }
        if let Some(color) = patch.color {
            fields.insert("color".to_string(), Value::from(color));
        }
        if let Some(order) = patch.order {
            fields.insert("order".to_string(), Value::from(order));
        }
        self.client.fetch::<CategoryRecord>(id).await?;
        let updated: CategoryRecord = self.client.update(id, fields).await?;
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> TaskResult<Category> {
        let existing = self.get(id).await?;
        self.client.delete(id).await?;
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{
        CategoryRecord, Envelope, RemoteGateway, RemoteSettings, TaskRecord, patch_fields,
    };
    use crate::error::{GatewayError, TaskError};
    use crate::gateway::TaskGateway;
    use crate::task::{Category, Priority, Task, TaskPatch};

    #[test]
    fn task_record_maps_sparse_rows() {
        let raw = json!({
            "Id": 12,
            "title": "Call dentist",
            "categoryId": 4,
            "priority": "high",
            "createdAt": "2026-02-16T05:00:00Z",
            "order": 1771218000000_i64
        });
        let task: Task = serde_json::from_value::<TaskRecord>(raw).unwrap().into();
        assert_eq!(task.id, 12);
        assert_eq!(task.description, "");
        assert_eq!(task.priority, Priority::High);
        assert!(task.due_date.is_none());
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn category_record_fills_color() {
        let raw = json!({"Id": 3, "name": "Errands"});
        let category: Category = serde_json::from_value::<CategoryRecord>(raw).unwrap().into();
        assert_eq!(category.color, "#6B7280");
        assert_eq!(category.order, 0);
    }

    #[test]
    fn patch_sends_only_set_fields() {
        let fields = patch_fields(TaskPatch {
            completed: Some(true),
            due_date: Some(None),
            ..TaskPatch::default()
        });
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["completed"], json!(true));
        assert!(fields["dueDate"].is_null());
    }

    #[test]
    fn failed_record_result_is_rejected() {
        let raw = json!({
            "success": true,
            "results": [{"success": false, "message": "Id is invalid"}]
        });
        let envelope: Envelope<TaskRecord> = serde_json::from_value(raw).unwrap();
        let err = envelope.first_result().unwrap_err();
        assert!(matches!(
            err,
            TaskError::Gateway(GatewayError::Rejected(ref msg)) if msg == "Id is invalid"
        ));
    }

    #[test]
    fn unsuccessful_envelope_is_rejected() {
        let raw = json!({"success": false, "message": "bad key"});
        let envelope: Envelope<Vec<TaskRecord>> = serde_json::from_value(raw).unwrap();
        assert!(envelope.ensure_success().is_err());
    }

    const RECORD: &str = r#"{"Id":7,"title":"Water plants","categoryId":1,"createdAt":"2026-02-16T05:00:00Z","order":1}"#;

    /// Answers one connection per canned `(status, body)` and returns the
    /// request lines it saw.
    fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();

                let mut length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':')
                        && name.eq_ignore_ascii_case("content-length")
                    {
                        length = value.trim().parse().unwrap();
                    }
                }
                let mut payload = vec![0; length];
                reader.read_exact(&mut payload).unwrap();
                seen.push(request_line.trim_end().to_string());

                let reply = format!(
                    "HTTP/1.1 {status} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    fn gateway_for(base_url: String) -> RemoteGateway {
        RemoteGateway::new(&RemoteSettings {
            base_url,
            timeout: Duration::from_secs(5),
            ..RemoteSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found_and_writes_nothing() {
        let (url, server) = serve(vec![(
            404,
            r#"{"success":false,"message":"Record does not exist"}"#.to_string(),
        )]);
        let gateway = gateway_for(url);

        let err = gateway.update(999, TaskPatch::completed(true)).await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound { id: 999, .. }));
        let requests = server.join().unwrap();
        assert_eq!(requests, vec!["GET /tables/Tasks/records/999 HTTP/1.1".to_string()]);
    }

    #[tokio::test]
    async fn delete_of_missing_record_is_not_found() {
        let (url, server) = serve(vec![(200, r#"{"success":true,"data":null}"#.to_string())]);
        let gateway = gateway_for(url);

        let err = gateway.delete(999).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_without_results_is_rejected() {
        let (url, server) = serve(vec![
            (200, format!(r#"{{"success":true,"data":{RECORD}}}"#)),
            (200, r#"{"success":true,"results":[]}"#.to_string()),
        ]);
        let gateway = gateway_for(url);

        let err = gateway.delete(7).await.unwrap_err();
        assert!(matches!(err, TaskError::Gateway(GatewayError::Rejected(_))));
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /tables/Tasks/records/7 "));
        assert!(requests[1].starts_with("DELETE /tables/Tasks/records "));
    }

    #[tokio::test]
    async fn update_of_existing_record_returns_the_stored_row() {
        let updated = RECORD.replace(r#""order":1"#, r#""order":1,"completed":true"#);
        let (url, server) = serve(vec![
            (200, format!(r#"{{"success":true,"data":{RECORD}}}"#)),
            (
                200,
                format!(r#"{{"success":true,"results":[{{"success":true,"data":{updated}}}]}}"#),
            ),
        ]);
        let gateway = gateway_for(url);

        let task = gateway.update(7, TaskPatch::completed(true)).await.unwrap();
        assert_eq!(task.id, 7);
        assert!(task.completed);
        assert_eq!(task.title, "Water plants");
        let requests = server.join().unwrap();
        assert!(requests[1].starts_with("PUT /tables/Tasks/records "));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let settings = RemoteSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
            ..RemoteSettings::default()
        };
        let gateway = RemoteGateway::new(&settings).unwrap();
        let err = gateway.list().await.unwrap_err();
        assert!(matches!(err, TaskError::Gateway(GatewayError::Transport(_))));
        assert!(!err.is_not_found());
    }
}
