use crate::domain::model::{
    AuditRecord, CapacityChange, CapacityTarget, Enrollment, EnrollmentPatch, Student, Subject,
};
use crate::domain::ports::{CatalogDirectory, EnrollmentStore};
use crate::utils::error::{Result, RosterError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PREFER_REPRESENTATION: &str = "return=representation";

/// 透過 PostgREST 風格 HTTP API 存取遠端關聯式資料庫。
///
/// 容量調整走 `rpc/apply_capacity_changes`，條件判斷在伺服器端的同一個交易內完成。
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CapacityRpcRequest<'a> {
    subject_id: &'a str,
    changes: &'a [CapacityChange],
}

#[derive(Debug, Deserialize)]
struct CapacityRpcError {
    error: String,
    target: Option<CapacityTarget>,
}

impl RestStore {
    pub fn new(endpoint: &str, api_key: &str, timeout_seconds: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key).map_err(|e| RosterError::InvalidConfigValueError {
            field: "store.api_key".to_string(),
            value: "<redacted>".to_string(),
            reason: e.to_string(),
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
            RosterError::InvalidConfigValueError {
                field: "store.api_key".to_string(),
                value: "<redacted>".to_string(),
                reason: e.to_string(),
            }
        })?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Store request '{}' failed with {}: {}", operation, status, body);
        Err(RosterError::persistence(format!(
            "{} failed with status {}: {}",
            operation, status, body
        )))
    }

    async fn first_row<T: DeserializeOwned>(
        response: Response,
        operation: &str,
    ) -> Result<Option<T>> {
        let rows: Vec<T> = Self::ensure_success(response, operation).await?.json().await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl CatalogDirectory for RestStore {
    async fn fetch_subject_catalog(&self, subject_id: &str) -> Result<Option<Subject>> {
        tracing::debug!("Fetching subject catalog {}", subject_id);
        let response = self
            .client
            .get(self.url("subjects"))
            .query(&[("id", format!("eq.{}", subject_id)), ("select", "*".to_string())])
            .send()
            .await?;
        Self::first_row(response, "fetch_subject_catalog").await
    }

    async fn fetch_active_students(&self) -> Result<Vec<Student>> {
        let response = self
            .client
            .get(self.url("students"))
            .query(&[("is_active", "eq.true")])
            .send()
            .await?;
        Ok(Self::ensure_success(response, "fetch_active_students")
            .await?
            .json()
            .await?)
    }

    async fn fetch_student(&self, student_id: &str) -> Result<Option<Student>> {
        let response = self
            .client
            .get(self.url("students"))
            .query(&[("id", format!("eq.{}", student_id))])
            .send()
            .await?;
        Self::first_row(response, "fetch_student").await
    }
}

#[async_trait]
impl EnrollmentStore for RestStore {
    async fn fetch_enrollments(&self, subject_id: &str) -> Result<Vec<Enrollment>> {
        let response = self
            .client
            .get(self.url("enrollments"))
            .query(&[
                ("subject_id", format!("eq.{}", subject_id)),
                ("order", "created_at.asc".to_string()),
            ])
            .send()
            .await?;
        Ok(Self::ensure_success(response, "fetch_enrollments")
            .await?
            .json()
            .await?)
    }

    async fn persist_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment> {
        let response = self
            .client
            .post(self.url("enrollments"))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&enrollment)
            .send()
            .await?;

        // 唯一索引 (student_id, subject_id) 衝突
        if response.status() == StatusCode::CONFLICT {
            return Err(RosterError::AlreadyEnrolled {
                student_id: enrollment.student_id,
                subject_id: enrollment.subject_id,
            });
        }

        Self::first_row(response, "persist_enrollment")
            .await?
            .ok_or_else(|| RosterError::persistence("persist_enrollment returned no row"))
    }

    async fn update_enrollment(&self, id: &str, patch: EnrollmentPatch) -> Result<Enrollment> {
        let response = self
            .client
            .patch(self.url("enrollments"))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&patch)
            .send()
            .await?;
        Self::first_row(response, "update_enrollment")
            .await?
            .ok_or_else(|| RosterError::persistence(format!("enrollment {} does not exist", id)))
    }

    async fn delete_enrollment(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url("enrollments"))
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        Self::ensure_success(response, "delete_enrollment").await?;
        Ok(())
    }

    async fn apply_capacity_changes(
        &self,
        subject_id: &str,
        changes: &[CapacityChange],
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url("rpc/apply_capacity_changes"))
            .json(&CapacityRpcRequest {
                subject_id,
                changes,
            })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let body: CapacityRpcError = response.json().await?;
            let target = body.target.ok_or_else(|| {
                RosterError::persistence(format!("capacity rpc rejected: {}", body.error))
            })?;
            return Err(match body.error.as_str() {
                "capacity_exceeded" => RosterError::CapacityExceeded { target },
                "counter_underflow" => RosterError::CounterUnderflow { target },
                other => RosterError::persistence(format!("capacity rpc rejected: {}", other)),
            });
        }

        Self::ensure_success(response, "apply_capacity_changes").await?;
        Ok(())
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        let response = self
            .client
            .post(self.url("audit_log"))
            .json(&record)
            .send()
            .await?;
        Self::ensure_success(response, "append_audit").await?;
        Ok(())
    }
}
