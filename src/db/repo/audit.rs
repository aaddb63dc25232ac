//! Interface history rows for the repository.

use super::Repository;
use crate::audit::{AuditCall, AuditCompletion, AuditHandle, AuditSink, SUCCESS_CODE};
use crate::domain::TimeMs;
use async_trait::async_trait;

#[async_trait]
impl AuditSink for Repository {
    async fn insert_started(
        &self,
        handle: AuditHandle,
        call: &AuditCall,
        at: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO interface_history (
                id, provider, api, url, order_id, request, status, started_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'STARTED', ?)
            "#,
        )
        .bind(handle.to_string())
        .bind(call.provider.as_str())
        .bind(call.api.as_str())
        .bind(call.url.as_str())
        .bind(call.order_id.as_str())
        .bind(call.request.to_string())
        .bind(at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, completion: &AuditCompletion) -> Result<(), sqlx::Error> {
        let status = if completion.response_code == SUCCESS_CODE
            && completion.error_message.is_none()
        {
            "SUCCESS"
        } else {
            "FAILED"
        };

        let updated = sqlx::query(
            r#"
            UPDATE interface_history
            SET response = ?, response_code = ?, http_status = ?, error_message = ?,
                status = ?, completed_at = ?, processing_ms = ? - started_at
            WHERE id = ?
            "#,
        )
        .bind(completion.response.as_deref())
        .bind(completion.response_code.as_str())
        .bind(completion.http_status.map(i64::from))
        .bind(completion.error_message.as_deref())
        .bind(status)
        .bind(completion.at.as_ms())
        .bind(completion.at.as_ms())
        .bind(completion.handle.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}
