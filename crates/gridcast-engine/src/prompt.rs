//! Prompt template loading and rendering via `minijinja`.
//!
//! Templates ship embedded in the crate so the engine works out of the
//! box; operators can point at a directory on disk to tune prompts
//! without recompiling. Three templates exist: `system.j2` (persona
//! framing), `draft.j2` (the full context pack), and `critic.j2` (the
//! violation diff for repair passes).

use minijinja::Environment;

use crate::error::EngineError;

/// Embedded default templates.
const SYSTEM_TEMPLATE: &str = include_str!("../templates/system.j2");
const DRAFT_TEMPLATE: &str = include_str!("../templates/draft.j2");
const CRITIC_TEMPLATE: &str = include_str!("../templates/critic.j2");

/// The complete rendered prompt ready to send to an LLM backend.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// System message establishing the expert's persona and the rules.
    pub system: String,
    /// User message containing the pack (or the violation diff).
    pub user: String,
}

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create a prompt engine from the embedded default templates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Template`] only if the embedded templates
    /// are corrupt, which the test suite guards against.
    pub fn embedded() -> Result<Self, EngineError> {
        Self::from_sources(
            SYSTEM_TEMPLATE.to_owned(),
            DRAFT_TEMPLATE.to_owned(),
            CRITIC_TEMPLATE.to_owned(),
        )
    }

    /// Create a prompt engine loading `system.j2`, `draft.j2`, and
    /// `critic.j2` from a directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Template`] when a file is missing or fails
    /// to parse.
    pub fn from_dir(templates_dir: &str) -> Result<Self, EngineError> {
        Self::from_sources(
            load_template(templates_dir, "system.j2")?,
            load_template(templates_dir, "draft.j2")?,
            load_template(templates_dir, "critic.j2")?,
        )
    }

    fn from_sources(system: String, draft: String, critic: String) -> Result<Self, EngineError> {
        let mut env = Environment::new();
        env.add_template_owned("system", system)
            .map_err(|e| EngineError::Template(format!("failed to add system template: {e}")))?;
        env.add_template_owned("draft", draft)
            .map_err(|e| EngineError::Template(format!("failed to add draft template: {e}")))?;
        env.add_template_owned("critic", critic)
            .map_err(|e| EngineError::Template(format!("failed to add critic template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the draft prompt from a serialized context pack.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Template`] if rendering fails.
    pub fn render_draft(
        &self,
        pack: &serde_json::Value,
    ) -> Result<RenderedPrompt, EngineError> {
        Ok(RenderedPrompt {
            system: self.render("system", pack)?,
            user: self.render("draft", pack)?,
        })
    }

    /// Render the critic/repair prompt from the violation context.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Template`] if rendering fails.
    pub fn render_critic(
        &self,
        context: &serde_json::Value,
    ) -> Result<RenderedPrompt, EngineError> {
        Ok(RenderedPrompt {
            system: self.render("system", context)?,
            user: self.render("critic", context)?,
        })
    }

    fn render(&self, name: &str, context: &serde_json::Value) -> Result<String, EngineError> {
        self.env
            .get_template(name)
            .map_err(|e| EngineError::Template(format!("missing {name} template: {e}")))?
            .render(context)
            .map_err(|e| EngineError::Template(format!("{name} render failed: {e}")))
    }
}

/// Read a template file from disk.
fn load_template(dir: &str, filename: &str) -> Result<String, EngineError> {
    let path = format!("{dir}/{filename}");
    std::fs::read_to_string(&path)
        .map_err(|e| EngineError::Template(format!("failed to read {path}: {e}")))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn engine() -> PromptEngine {
        match PromptEngine::embedded() {
            Ok(engine) => engine,
            Err(e) => panic!("embedded templates failed: {e}"),
        }
    }

    #[test]
    fn embedded_templates_load() {
        assert!(PromptEngine::embedded().is_ok());
    }

    #[test]
    fn draft_prompt_includes_persona_and_game() {
        let engine = engine();
        let pack = serde_json::json!({
            "persona": {
                "display_name": "The Analyst",
                "voice": "Measured and evidence-first.",
                "personality": "conservative"
            },
            "game": {
                "game_id": "2025-W5-KC-BUF",
                "season": 2025,
                "week": 5,
                "home_team": "KC",
                "away_team": "BUF",
                "venue": "Arrowhead Stadium",
                "weather": null,
                "market_lines": {
                    "spread": -3.0,
                    "total": 47.5,
                    "moneyline_home": -160,
                    "moneyline_away": 140
                },
                "injuries": []
            },
            "memories": [],
            "live_briefs": [],
            "priors": [],
            "guardrails": { "stake_cap": "2.5", "risk_profile": "cautious" }
        });
        let rendered = engine.render_draft(&pack).ok();
        assert!(rendered.as_ref().is_some_and(|p| p.system.contains("The Analyst")));
        assert!(rendered.as_ref().is_some_and(|p| p.user.contains("KC")));
    }

    #[test]
    fn critic_prompt_lists_violations() {
        let engine = engine();
        let context = serde_json::json!({
            "persona": {
                "display_name": "The Analyst",
                "voice": "v",
                "personality": "conservative"
            },
            "violations": [
                { "category_id": "total_full_game", "rule": "missing_category",
                  "detail": "category absent from draft" }
            ]
        });
        let rendered = engine.render_critic(&context).ok();
        assert!(rendered.is_some_and(|p| p.user.contains("total_full_game")));
    }

    #[test]
    fn missing_directory_is_a_template_error() {
        let result = PromptEngine::from_dir("/nonexistent/templates");
        assert!(matches!(result, Err(EngineError::Template(_))));
    }
}
