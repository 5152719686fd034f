use crate::domain::models::{ActivityTemplate, ScheduleBlock};
use crate::infrastructure::text_client::TextGenerationClient;
use serde::Serialize;
use std::sync::Arc;

pub const MISSING_KEY_MESSAGE: &str =
    "⚠️ API Key no configurada. Por favor configura tu API Key de Google para usar el asistente.";
pub const CONNECTIVITY_MESSAGE: &str = "Error al conectar con el oráculo de productividad.";
pub const EMPTY_RESPONSE_MESSAGE: &str = "No pude generar un análisis en este momento.";
const EMPTY_SCHEDULE_LINE: &str = "No hay actividades planeadas aún.";

/// Single-slot request state for the analysis affordance: at most one
/// request in flight, a second trigger is rejected rather than queued.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum AnalysisSlot {
    #[default]
    Idle,
    Pending,
    Ready(String),
}

/// One line per resolvable block: start time, duration, name, category,
/// score. Stale blocks are hidden from the summary. Hours are not wrapped
/// modulo 24 so past-midnight placements read as 25:30 and alike.
pub fn build_prompt(
    blocks: &[ScheduleBlock],
    catalog: &[ActivityTemplate],
    total_score: i32,
) -> String {
    let lines: Vec<String> = blocks
        .iter()
        .filter_map(|block| {
            let source = block.display_source(catalog)?;
            Some(format!(
                "- {}:{:02} ({}min): {} [{}] (Puntos: {})",
                block.start_time / 60,
                block.start_time % 60,
                block.duration,
                source.name(),
                source.category().label(),
                source.score()
            ))
        })
        .collect();

    let summary = if lines.is_empty() {
        EMPTY_SCHEDULE_LINE.to_string()
    } else {
        lines.join("\n")
    };

    format!(
        "Actúa como un coach de productividad de clase mundial.\n\
         Analiza mi día planeado.\n\n\
         Datos del día:\n\
         Puntaje Total: {total_score} (El objetivo es maximizar puntos positivos sin agotarse).\n\n\
         Agenda:\n\
         {summary}\n\n\
         Dame un feedback corto, elegante y motivador (máximo 3 oraciones).\n\
         Si el puntaje es bajo, sugiere un cambio específico.\n\
         Usa un tono sofisticado pero directo.\n\
         Responde en texto plano, sin markdown complejo."
    )
}

/// Relays a day summary to the text-generation service and degrades every
/// failure to a fixed user-facing string; this path never surfaces an
/// error and never touches schedule state.
pub struct AnalysisService {
    client: Arc<dyn TextGenerationClient>,
    model: String,
}

impl AnalysisService {
    pub fn new(client: Arc<dyn TextGenerationClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn analyze(&self, api_key: Option<&str>, prompt: &str) -> String {
        let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) else {
            return MISSING_KEY_MESSAGE.to_string();
        };

        match self.client.generate(api_key, &self.model, prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => EMPTY_RESPONSE_MESSAGE.to_string(),
            Err(_) => CONNECTIVITY_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Category;
    use crate::infrastructure::error::InfraError;
    use async_trait::async_trait;

    enum StubBehavior {
        Succeed(&'static str),
        Empty,
        Fail,
    }

    struct StubClient(StubBehavior);

    #[async_trait]
    impl TextGenerationClient for StubClient {
        async fn generate(
            &self,
            _api_key: &str,
            _model: &str,
            _prompt: &str,
        ) -> Result<Option<String>, InfraError> {
            match &self.0 {
                StubBehavior::Succeed(text) => Ok(Some(text.to_string())),
                StubBehavior::Empty => Ok(None),
                StubBehavior::Fail => Err(InfraError::Network("connection refused".to_string())),
            }
        }
    }

    fn service(behavior: StubBehavior) -> AnalysisService {
        AnalysisService::new(Arc::new(StubClient(behavior)), "test-model")
    }

    fn template() -> ActivityTemplate {
        ActivityTemplate {
            id: "act-1".to_string(),
            name: "Deep Work".to_string(),
            category: Category::WorkStudy,
            score: 5,
            default_duration: 60,
            color: "blue".to_string(),
            icon: None,
        }
    }

    #[test]
    fn prompt_lists_each_block_with_time_and_score() {
        let catalog = vec![template()];
        let blocks = vec![ScheduleBlock {
            id: "blk-1".to_string(),
            activity_id: "act-1".to_string(),
            start_time: 570,
            duration: 90,
            snapshot: None,
        }];

        let prompt = build_prompt(&blocks, &catalog, 5);
        assert!(prompt.contains("- 9:30 (90min): Deep Work [Trabajo/Estudio] (Puntos: 5)"));
        assert!(prompt.contains("Puntaje Total: 5"));
    }

    #[test]
    fn prompt_keeps_past_midnight_hours_unwrapped() {
        let catalog = vec![template()];
        let blocks = vec![ScheduleBlock {
            id: "blk-1".to_string(),
            activity_id: "act-1".to_string(),
            start_time: 1530,
            duration: 30,
            snapshot: None,
        }];

        let prompt = build_prompt(&blocks, &catalog, 5);
        assert!(prompt.contains("- 25:30 (30min)"));
    }

    #[test]
    fn prompt_hides_stale_blocks_and_notes_an_empty_agenda() {
        let blocks = vec![ScheduleBlock {
            id: "blk-1".to_string(),
            activity_id: "gone".to_string(),
            start_time: 540,
            duration: 60,
            snapshot: None,
        }];
        let prompt = build_prompt(&blocks, &[], 0);
        assert!(prompt.contains(EMPTY_SCHEDULE_LINE));
    }

    #[tokio::test]
    async fn missing_key_maps_to_the_configuration_message() {
        let service = service(StubBehavior::Fail);
        assert_eq!(service.analyze(None, "prompt").await, MISSING_KEY_MESSAGE);
        assert_eq!(
            service.analyze(Some("   "), "prompt").await,
            MISSING_KEY_MESSAGE
        );
    }

    #[tokio::test]
    async fn network_failure_maps_to_the_connectivity_message() {
        let service = service(StubBehavior::Fail);
        assert_eq!(
            service.analyze(Some("key"), "prompt").await,
            CONNECTIVITY_MESSAGE
        );
    }

    #[tokio::test]
    async fn empty_response_maps_to_the_no_analysis_message() {
        let service = service(StubBehavior::Empty);
        assert_eq!(
            service.analyze(Some("key"), "prompt").await,
            EMPTY_RESPONSE_MESSAGE
        );
    }

    #[tokio::test]
    async fn generated_text_is_returned_verbatim() {
        let service = service(StubBehavior::Succeed("Excelente plan."));
        assert_eq!(
            service.analyze(Some("key"), "prompt").await,
            "Excelente plan."
        );
    }
}
