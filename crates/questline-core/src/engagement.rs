//! Daily engagement content.
//!
//! Motivation and reminders come from a [`ContentGenerator`]. When it fails,
//! times out or returns unusable content, fixed fallback content is returned
//! instead and flagged as [`ContentSource::Fallback`].

use std::future::Future;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ContentError;
use crate::progress::ProgressSnapshot;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(15);

const FALLBACK_QUOTE: &str = "Success is not final, failure is not fatal: it is the courage to continue that counts. - Winston Churchill";

/// What the generator knows about the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementRequest {
    pub user_id: String,
    pub domain: Option<String>,
    pub level: u32,
    pub current_streak: u32,
    pub total_points: u64,
}

impl EngagementRequest {
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        Self {
            user_id: snapshot.user_id.clone(),
            domain: snapshot.domain.clone(),
            level: snapshot.current_level().level,
            current_streak: snapshot.streak.current_streak,
            total_points: snapshot.total_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMotivation {
    pub quote: String,
    pub tip: String,
    pub challenge: String,
    pub goal_reminder: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Goal,
    Milestone,
    Practice,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub title: String,
    pub message: String,
    #[serde(with = "hh_mm")]
    pub scheduled_time: NaiveTime,
    pub frequency: ReminderFrequency,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementContent {
    pub daily_motivation: DailyMotivation,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl EngagementContent {
    /// Parse generator output. Text around the outermost JSON object is ignored.
    pub fn parse(text: &str) -> Result<Self, ContentError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if start < end => &text[start..=end],
            _ => return Err(ContentError::Malformed("no JSON object found".into())),
        };
        let content: EngagementContent =
            serde_json::from_str(json).map_err(|e| ContentError::Malformed(e.to_string()))?;
        content.check()?;
        Ok(content)
    }

    fn check(&self) -> Result<(), ContentError> {
        let m = &self.daily_motivation;
        if [&m.quote, &m.tip, &m.challenge, &m.goal_reminder]
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(ContentError::Malformed("empty motivation field".into()));
        }
        Ok(())
    }

    /// Fixed content used when generation fails.
    pub fn fallback(domain: Option<&str>) -> Self {
        Self {
            daily_motivation: DailyMotivation {
                quote: FALLBACK_QUOTE.to_string(),
                tip: format!(
                    "Spend 30 minutes today practicing your {}",
                    domain.unwrap_or("skills")
                ),
                challenge: "Complete one learning task from your roadmap today".to_string(),
                goal_reminder: "Every step forward is progress toward your career goals!"
                    .to_string(),
            },
            reminders: vec![Reminder {
                id: "reminder-daily".to_string(),
                kind: ReminderKind::Practice,
                title: "Daily Learning".to_string(),
                message: "Time for your daily skill building session!".to_string(),
                scheduled_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
                frequency: ReminderFrequency::Daily,
                is_active: true,
            }],
        }
    }
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub content: EngagementContent,
    pub source: ContentSource,
}

/// External content generation service.
pub trait ContentGenerator: Send + Sync {
    fn generate(
        &self,
        request: &EngagementRequest,
    ) -> impl Future<Output = Result<EngagementContent, ContentError>> + Send;
}

/// Generator used when no content service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGenerator;

impl ContentGenerator for NoGenerator {
    async fn generate(&self, _request: &EngagementRequest) -> Result<EngagementContent, ContentError> {
        Err(ContentError::Unavailable("no content service configured".into()))
    }
}

pub struct EngagementService<G> {
    generator: G,
    timeout: Duration,
}

impl<G: ContentGenerator> EngagementService<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Content for today. Never fails: generator errors yield fallback content.
    pub async fn daily_engagement(&self, snapshot: &ProgressSnapshot) -> Engagement {
        let request = EngagementRequest::from_snapshot(snapshot);
        let generated = tokio::time::timeout(self.timeout, self.generator.generate(&request))
            .await
            .unwrap_or(Err(ContentError::TimedOut))
            .and_then(|content| content.check().map(|()| content));

        match generated {
            Ok(content) => {
                debug!(user_id = %request.user_id, "generated engagement content");
                Engagement {
                    content,
                    source: ContentSource::Generated,
                }
            }
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "content generation failed, using fallback");
                Engagement {
                    content: EngagementContent::fallback(request.domain.as_deref()),
                    source: ContentSource::Fallback,
                }
            }
        }
    }
}

impl Default for EngagementService<NoGenerator> {
    fn default() -> Self {
        Self::new(NoGenerator)
    }
}
