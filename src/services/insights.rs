//! Insight generation and persistence.
//!
//! One generation request reads the scoped record set, builds a bounded
//! prompt, calls the generative backend, and persists the resulting text.
//! Generation failures surface unmodified and persist nothing.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::{DbError, DbPool, DbResult, ListResult, Page},
    insight::{
        prompt::{PromptBuilder, PromptScope},
        GenerationConfig, GenerationError, GenerativeClient,
    },
    models::{CostRecordFilter, InsightFilter, InsightKind, InsightRecord, NewInsight},
};

/// Upper bound on records fed into one prompt. The prompt builder applies
/// its own character budget on top of this.
const MAX_PROMPT_RECORDS: i64 = 500;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Parameters for one insight generation request.
#[derive(Debug, Clone)]
pub struct InsightRequest {
    pub insight_type: InsightKind,
    /// Free-text question, used by `natural_query` and unknown kinds.
    pub query: Option<String>,
    pub project: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct InsightService {
    db: Arc<DbPool>,
    generator: Arc<dyn GenerativeClient>,
    prompt: PromptBuilder,
}

impl InsightService {
    pub fn new(
        db: Arc<DbPool>,
        generator: Arc<dyn GenerativeClient>,
        prompt_budget_chars: usize,
    ) -> Self {
        Self {
            db,
            generator,
            prompt: PromptBuilder::with_budget(prompt_budget_chars),
        }
    }

    /// Generate an insight over the scoped record set and persist it.
    #[tracing::instrument(skip(self, request), fields(insight_type = %request.insight_type))]
    pub async fn generate(&self, request: InsightRequest) -> Result<InsightRecord, InsightError> {
        let filter = CostRecordFilter {
            project: request.project.clone(),
            start_date: request
                .start_date
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc()),
            end_date: request
                .end_date
                .map(|d| d.and_hms_opt(23, 59, 59).expect("valid time").and_utc()),
            ..Default::default()
        };
        let records = self
            .db
            .cost_records()
            .list(
                &filter,
                Page {
                    skip: 0,
                    limit: MAX_PROMPT_RECORDS,
                },
            )
            .await?;

        let scope = PromptScope {
            project: request.project.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
        };
        let prompt = self.prompt.build(
            &request.insight_type,
            request.query.as_deref(),
            &scope,
            &records.items,
        );

        let text = self
            .generator
            .generate(&prompt, &GenerationConfig::default())
            .await?;

        let persisted = self
            .db
            .insights()
            .create(NewInsight {
                insight_type: request.insight_type,
                insight_text: text,
                related_cost_record_id: None,
                sentiment: None,
                generated_at: None,
            })
            .await?;
        tracing::info!(insight_id = %persisted.id, "insight generated");
        Ok(persisted)
    }

    /// Persist an externally produced insight verbatim.
    pub async fn submit(&self, insight: NewInsight) -> DbResult<InsightRecord> {
        if insight.insight_text.trim().is_empty() {
            return Err(DbError::Validation(
                "insight_text cannot be empty".to_string(),
            ));
        }
        self.db.insights().create(insight).await
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<InsightRecord>> {
        self.db.insights().get_by_id(id).await
    }

    pub async fn list(
        &self,
        filter: &InsightFilter,
        page: Page,
    ) -> DbResult<ListResult<InsightRecord>> {
        self.db.insights().list(filter, page).await
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{db::tests::harness::create_test_db, models::NewCostRecord};

    struct FakeGenerator {
        response: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeGenerator {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn empty_handed() -> Arc<Self> {
            Arc::new(Self {
                response: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerativeClient for FakeGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _config: &GenerationConfig,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.response
                .clone()
                .map_err(|_| GenerationError::NoCandidates)
        }
    }

    async fn seeded_db() -> Arc<DbPool> {
        let db = Arc::new(create_test_db().await);
        db.cost_records()
            .upsert_batch(vec![NewCostRecord {
                service: "Compute Engine".to_string(),
                project: "proj-a".to_string(),
                sku: "sku-1".to_string(),
                time_period: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
                cost: 42.0,
                currency: "USD".to_string(),
                usage_amount: None,
                usage_unit: None,
            }])
            .await
            .unwrap();
        db
    }

    fn request(kind: InsightKind) -> InsightRequest {
        InsightRequest {
            insight_type: kind,
            query: None,
            project: None,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn generate_persists_the_model_response() {
        let db = seeded_db().await;
        let generator = FakeGenerator::answering("Spend is dominated by Compute Engine.");
        let service = InsightService::new(Arc::clone(&db), generator.clone(), 8000);

        let insight = service.generate(request(InsightKind::Summary)).await.unwrap();
        assert_eq!(insight.insight_text, "Spend is dominated by Compute Engine.");
        assert_eq!(insight.insight_type, InsightKind::Summary);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("sku-1"));
        assert!(prompts[0].contains("summarize the cloud spend trends"));

        let stored = db.insights().get_by_id(insight.id).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn scoped_requests_filter_the_record_set() {
        let db = seeded_db().await;
        let generator = FakeGenerator::answering("ok");
        let service = InsightService::new(Arc::clone(&db), generator.clone(), 8000);

        service
            .generate(InsightRequest {
                project: Some("proj-other".to_string()),
                ..request(InsightKind::Anomaly)
            })
            .await
            .unwrap();

        // No records match the project, so the prompt degrades to no-data.
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("No data available"));
        assert!(prompts[0].contains("Scope: project proj-other."));
    }

    #[tokio::test]
    async fn generation_failure_persists_nothing() {
        let db = seeded_db().await;
        let service = InsightService::new(Arc::clone(&db), FakeGenerator::empty_handed(), 8000);

        let err = service
            .generate(request(InsightKind::Summary))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InsightError::Generation(GenerationError::NoCandidates)
        ));

        let stored = db
            .insights()
            .list(&InsightFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(stored.total, 0);
    }

    #[tokio::test]
    async fn submit_rejects_blank_text() {
        let db = Arc::new(create_test_db().await);
        let service = InsightService::new(db, FakeGenerator::answering("unused"), 8000);

        let err = service
            .submit(NewInsight {
                insight_type: InsightKind::Summary,
                insight_text: "   ".to_string(),
                related_cost_record_id: None,
                sentiment: None,
                generated_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
