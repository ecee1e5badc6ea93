use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use super::types::{ModeScores, ResponseMode, RouteDecision, RouteSource};
use crate::config::RouterConfig;
use crate::services::llm::prompts::CLASSIFIER_SYSTEM_PROMPT;
use crate::services::llm::CompletionProvider;

/// Score bonus for a focused app that implies work.
const WORK_APP_PRIOR: i32 = 2;

const CLASSIFIER_MAX_TOKENS: u32 = 8;

fn laughter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)(lol|haha|hehe)(?:\s|$)").expect("static regex"))
}

pub fn classifier_prompt(utterance: &str, app: &str) -> String {
    let app = if app.trim().is_empty() { "unknown" } else { app };
    format!(
        "Classify the user's message into exactly one label: work or casual.\n\
         Rules:\n\
         - work: task-oriented, problem solving, email/code/productivity intent\n\
         - casual: social chat, greetings, jokes, gratitude, small talk\n\
         App context: {}\n\
         Message: {}\n\
         Output exactly one word: work or casual.",
        app, utterance
    )
}

/// Hybrid work/casual router: keyword rules decide clear cases, a one-word
/// model classification settles the rest.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    rules: RouterConfig,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl IntentRouter {
    pub fn new(mut rules: RouterConfig) -> Self {
        for list in [&mut rules.work_apps, &mut rules.work_keywords, &mut rules.casual_keywords] {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
            list.retain(|s| !s.is_empty());
            list.sort();
            list.dedup();
        }
        Self { rules }
    }

    pub fn rules(&self) -> &RouterConfig {
        &self.rules
    }

    pub fn score(&self, utterance: &str, app: &str) -> ModeScores {
        let text = utterance.trim().to_lowercase();
        let app = app.trim().to_lowercase();

        let mut work = 0;
        if self.rules.work_apps.contains(&app) {
            work += WORK_APP_PRIOR;
        }
        work += self.rules.work_keywords.iter().filter(|k| text.contains(k.as_str())).count() as i32;

        let mut casual = self
            .rules
            .casual_keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count() as i32;
        if laughter().is_match(&text) {
            casual += 1;
        }
        ModeScores { work, casual }
    }

    /// Rule-only verdict: `Some` when the score gap reaches the threshold.
    pub fn decide_by_rule(&self, scores: ModeScores) -> Option<ResponseMode> {
        if scores.gap() < self.rules.rule_gap_threshold {
            return None;
        }
        Some(if scores.work > scores.casual {
            ResponseMode::Work
        } else {
            ResponseMode::Casual
        })
    }

    pub async fn route(
        &self,
        utterance: &str,
        app: &str,
        model: Option<&dyn CompletionProvider>,
    ) -> RouteDecision {
        let scores = self.score(utterance, app);
        let (mode, source) = match self.decide_by_rule(scores) {
            Some(mode) => (mode, RouteSource::Rule),
            None => (classify_with_model(utterance, app, model).await, RouteSource::Model),
        };
        info!(
            "Mode route: source={} app={} work_score={} casual_score={} mode={}",
            source.as_str(),
            if app.is_empty() { "unknown" } else { app },
            scores.work,
            scores.casual,
            mode
        );
        RouteDecision { mode, source, scores }
    }
}

/// Fallback classification. Anything other than a clear `casual` answer,
/// including a failed call, counts as work.
async fn classify_with_model(utterance: &str, app: &str, model: Option<&dyn CompletionProvider>) -> ResponseMode {
    let Some(model) = model else {
        return ResponseMode::Work;
    };
    match model
        .complete(CLASSIFIER_SYSTEM_PROMPT, &classifier_prompt(utterance, app), CLASSIFIER_MAX_TOKENS)
        .await
    {
        Ok(reply) if reply.trim().to_lowercase().contains("casual") => ResponseMode::Casual,
        Ok(_) => ResponseMode::Work,
        Err(e) => {
            warn!("Mode classifier failed, defaulting to work: {}", e);
            ResponseMode::Work
        }
    }
}

/// Classify with the default rules.
pub async fn classify_response_mode(
    utterance: &str,
    app: &str,
    model: Option<&dyn CompletionProvider>,
) -> ResponseMode {
    IntentRouter::default().route(utterance, app, model).await.mode
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_app_prior_counts_double() {
        let router = IntentRouter::default();
        let scores = router.score("can you look at the code", "vscode");
        assert_eq!(scores, ModeScores { work: 2, casual: 0 });
        assert_eq!(router.decide_by_rule(scores), Some(ResponseMode::Work));
    }

    #[test]
    fn laughter_must_be_a_whole_word() {
        let router = IntentRouter::default();
        // "haha" also hits the casual keyword list, the laugh token adds one more
        assert_eq!(router.score("haha nice", "").casual, 2);
        assert_eq!(router.score("ahahaha", "").casual, 1);
        assert_eq!(router.score("lol", "").casual, 2);
    }

    #[test]
    fn distinct_keywords_count_once() {
        let router = IntentRouter::default();
        assert_eq!(router.score("bug bug bug", "").work, 1);
    }

    #[test]
    fn gap_of_one_is_ambiguous() {
        let router = IntentRouter::default();
        let scores = router.score("fix the build", "");
        assert_eq!(scores, ModeScores { work: 1, casual: 0 });
        assert_eq!(router.decide_by_rule(scores), None);
    }
}
