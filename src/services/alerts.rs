//! Alert dispatcher and webhook sink.
//!
//! Every send is best-effort: transport errors are logged here and never
//! propagate to the job execution loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::ParsedAnalysis;

/// Quality score below which a per-sample alert fires.
pub const LOW_QUALITY_THRESHOLD: f64 = 5.0;
/// Job average below this is critical; below [`COMPLETION_WARNING_THRESHOLD`]
/// is a warning; anything healthier is not sent at all.
pub const COMPLETION_WARNING_THRESHOLD: f64 = 7.0;
/// Cap on low-quality alerts per job, however many samples qualify.
pub const MAX_LOW_QUALITY_ALERTS_PER_JOB: u32 = 5;

/// Query preview length in the low-quality alert message.
const QUERY_PREVIEW_MAX_CHARS: usize = 100;
/// Issues quoted in the low-quality alert message.
const MAX_ISSUES_IN_ALERT: usize = 2;

/// Alert severity levels understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Structured key/value pair attached to an alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertField {
    pub name: String,
    pub value: String,
}

/// Notification payload handed to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub fields: Vec<AlertField>,
}

/// Sink transport failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AlertSinkError(pub String);

/// Notification transport (webhook, in production).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), AlertSinkError>;
}

/// Webhook-backed sink posting the alert as JSON.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), AlertSinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| AlertSinkError(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AlertSinkError(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Whether a successful outcome qualifies for a low-quality alert, honoring
/// the per-job dispatch cap.
pub fn should_alert_low_quality(parsed: &ParsedAnalysis, already_sent: u32) -> bool {
    already_sent < MAX_LOW_QUALITY_ALERTS_PER_JOB
        && parsed
            .quality_score
            .is_some_and(|score| score < LOW_QUALITY_THRESHOLD)
}

/// Formats and sends rate-limited notifications.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Option<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    /// A dispatcher without a sink silently drops every alert
    /// (alerting disabled by configuration).
    pub fn new(sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self { sink }
    }

    /// Per-sample alert for a low quality score. Callers only invoke this when
    /// the score is present and below [`LOW_QUALITY_THRESHOLD`].
    pub async fn low_quality(&self, tenant_id: &str, user_query: &str, parsed: &ParsedAnalysis) {
        let score = parsed.quality_score.unwrap_or_default();
        let preview: String = user_query.chars().take(QUERY_PREVIEW_MAX_CHARS).collect();

        let mut message = format!(
            "Low quality reply for tenant {} (score {:.1}).\nQuery: {}",
            tenant_id, score, preview
        );
        for issue in parsed.issues.iter().take(MAX_ISSUES_IN_ALERT) {
            message.push_str("\n- ");
            message.push_str(issue);
        }

        let alert = Alert {
            title: "Low quality analysis result".to_string(),
            message,
            severity: AlertSeverity::Critical,
            fields: vec![
                AlertField {
                    name: "tenant_id".to_string(),
                    value: tenant_id.to_string(),
                },
                AlertField {
                    name: "quality_score".to_string(),
                    value: format!("{:.1}", score),
                },
            ],
        };

        self.dispatch(alert).await;
    }

    /// Job completion summary. Healthy outcomes (average >= warning threshold)
    /// are suppressed entirely to avoid alert fatigue.
    pub async fn job_completion(
        &self,
        job_id: Uuid,
        target_date: NaiveDate,
        avg_score: f64,
        low_count: u32,
        total_count: u32,
    ) {
        let severity = if avg_score < LOW_QUALITY_THRESHOLD {
            AlertSeverity::Critical
        } else if avg_score < COMPLETION_WARNING_THRESHOLD {
            AlertSeverity::Warning
        } else {
            debug!(%job_id, avg_score, "Healthy job average, completion alert suppressed");
            return;
        };

        let alert = Alert {
            title: "Analysis job completed with low average score".to_string(),
            message: format!(
                "Job {} for {} averaged {:.2} over {} results ({} low-quality).",
                job_id, target_date, avg_score, total_count, low_count
            ),
            severity,
            fields: vec![
                AlertField {
                    name: "job_id".to_string(),
                    value: job_id.to_string(),
                },
                AlertField {
                    name: "target_date".to_string(),
                    value: target_date.to_string(),
                },
                AlertField {
                    name: "avg_score".to_string(),
                    value: format!("{:.2}", avg_score),
                },
            ],
        };

        self.dispatch(alert).await;
    }

    /// Best-effort send; sink errors are swallowed here.
    async fn dispatch(&self, alert: Alert) {
        let Some(sink) = &self.sink else {
            debug!(title = %alert.title, "Alerting disabled, dropping alert");
            return;
        };

        if let Err(e) = sink.send(&alert).await {
            warn!(title = %alert.title, "Failed to send alert: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every alert it receives.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &Alert) -> Result<(), AlertSinkError> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    /// Always fails; the dispatcher must swallow the error.
    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        async fn send(&self, _alert: &Alert) -> Result<(), AlertSinkError> {
            Err(AlertSinkError("connection refused".to_string()))
        }
    }

    fn low_parsed(score: f64) -> ParsedAnalysis {
        ParsedAnalysis {
            quality_score: Some(score),
            issues: vec![
                "wrong answer".to_string(),
                "hallucinated source".to_string(),
                "third issue never quoted".to_string(),
            ],
            issue_count: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_low_quality_message_has_preview_and_two_issues() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(Some(sink.clone()));

        let long_query = "x".repeat(250);
        dispatcher
            .low_quality("acme", &long_query, &low_parsed(2.0))
            .await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let alert = &sent[0];
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.message.contains(&"x".repeat(100)));
        assert!(!alert.message.contains(&"x".repeat(101)));
        assert!(alert.message.contains("wrong answer"));
        assert!(alert.message.contains("hallucinated source"));
        assert!(!alert.message.contains("third issue never quoted"));
    }

    #[tokio::test]
    async fn test_completion_severity_thresholds() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = AlertDispatcher::new(Some(sink.clone()));
        let job_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();

        dispatcher.job_completion(job_id, date, 4.2, 10, 50).await;
        dispatcher.job_completion(job_id, date, 6.5, 3, 50).await;
        dispatcher.job_completion(job_id, date, 8.0, 0, 50).await;

        let sent = sink.sent.lock().unwrap();
        // avg 8.0 is healthy and never sent
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].severity, AlertSeverity::Critical);
        assert_eq!(sent[1].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn test_sink_errors_are_swallowed() {
        let dispatcher = AlertDispatcher::new(Some(Arc::new(FailingSink)));
        // Must not panic or propagate
        dispatcher.low_quality("acme", "query", &low_parsed(1.0)).await;
        dispatcher
            .job_completion(
                Uuid::new_v4(),
                NaiveDate::from_ymd_opt(2025, 1, 16).unwrap(),
                3.0,
                5,
                20,
            )
            .await;
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_drops_alerts() {
        let dispatcher = AlertDispatcher::new(None);
        dispatcher.low_quality("acme", "query", &low_parsed(1.0)).await;
    }

    #[test]
    fn test_rate_limit_caps_at_five_per_job() {
        // 20 results all scoring 1.0: only the first five dispatch
        let parsed = ParsedAnalysis {
            quality_score: Some(1.0),
            ..Default::default()
        };

        let mut sent = 0u32;
        for _ in 0..20 {
            if should_alert_low_quality(&parsed, sent) {
                sent += 1;
            }
        }
        assert_eq!(sent, MAX_LOW_QUALITY_ALERTS_PER_JOB);
    }

    #[test]
    fn test_no_alert_without_score_or_above_threshold() {
        assert!(!should_alert_low_quality(&ParsedAnalysis::default(), 0));

        let healthy = ParsedAnalysis {
            quality_score: Some(5.0),
            ..Default::default()
        };
        assert!(!should_alert_low_quality(&healthy, 0));

        let low = ParsedAnalysis {
            quality_score: Some(4.9),
            ..Default::default()
        };
        assert!(should_alert_low_quality(&low, 0));
    }
}
