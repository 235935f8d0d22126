//! The ReAct decision loop: one task episode from reset to termination.
//!
//! An episode plans once, then repeats
//! observe -> retrieve -> reason -> act -> step until the environment reports
//! `done` or `max_steps` is reached. Retrieval is skipped entirely for any
//! phase whose template has no `{examples}` placeholder.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::ReactConfig;
use crate::env::Environment;
use crate::model::prompt::{
    format_examples, format_history, references_examples, render, truncate_field,
    PLACEHOLDER_EXAMPLES, PLACEHOLDER_GOAL, PLACEHOLDER_HISTORY, PLACEHOLDER_OBSERVATION,
    PLACEHOLDER_PLAN, PLACEHOLDER_REASONING,
};
use crate::model::{ChatMessage, CompletionBackend, EmbeddingProvider};
use crate::storage::StorageAdapter;
use crate::trajectory::{Retriever, Step, StepExample, Trajectory};

/// Called after each step is recorded, before the environment is stepped.
pub type StepCallback = Box<dyn Fn(usize, &Step) + Send + Sync>;

/// Field values for one prompt, before truncation.
struct PromptContext<'a> {
    goal: &'a str,
    plan: &'a str,
    observation: &'a str,
    reasoning: &'a str,
    history: &'a [Step],
    examples: &'a [StepExample],
}

pub struct DecisionLoop<B> {
    backend: B,
    config: ReactConfig,
    on_step: Option<StepCallback>,
}

impl<B: CompletionBackend> DecisionLoop<B> {
    pub fn new(backend: B, config: ReactConfig) -> Self {
        Self {
            backend,
            config,
            on_step: None,
        }
    }

    /// Install a callback invoked with `(step_index, &step)` for every step.
    pub fn with_step_callback(
        mut self,
        callback: impl Fn(usize, &Step) + Send + Sync + 'static,
    ) -> Self {
        self.on_step = Some(Box::new(callback));
        self
    }

    pub fn set_step_callback(&mut self, callback: Option<StepCallback>) {
        self.on_step = callback;
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one episode for `goal` in `env`.
    ///
    /// Every trajectory retrieved along the way is credited with the episode
    /// outcome before returning. The finished trajectory is not stored.
    pub async fn run<S, E, En>(
        &self,
        retriever: &mut Retriever<S, E>,
        env: &mut En,
        goal: &str,
    ) -> Result<Trajectory>
    where
        S: StorageAdapter,
        E: EmbeddingProvider,
        En: Environment,
    {
        let templates = &self.config.templates;

        // Init
        retriever.clear_retrieved();
        let mut observation = env
            .reset(goal)
            .await
            .context("environment reset failed")?;
        info!(goal = %goal, "episode started");

        // Planning
        let plan_examples = if references_examples(&templates.plan) {
            retriever.retrieve_for_plan(goal, None).await?
        } else {
            Vec::new()
        };
        let plan_prompt = self.render_prompt(
            &templates.plan,
            &PromptContext {
                goal,
                plan: "",
                observation: &observation,
                reasoning: "",
                history: &[],
                examples: &plan_examples,
            },
        );
        let plan = self.complete(plan_prompt).await.context("planning failed")?;
        debug!(chars = plan.len(), examples = plan_examples.len(), "plan generated");

        // Loop
        let step_needs_examples =
            references_examples(&templates.reasoning) || references_examples(&templates.action);
        let mut steps: Vec<Step> = Vec::new();
        let mut success = false;

        for step_index in 0..self.config.max_steps {
            let examples = if step_needs_examples {
                retriever
                    .retrieve_for_step(goal, &plan, &observation, None)
                    .await?
            } else {
                Vec::new()
            };

            let reasoning_prompt = self.render_prompt(
                &templates.reasoning,
                &PromptContext {
                    goal,
                    plan: &plan,
                    observation: &observation,
                    reasoning: "",
                    history: &steps,
                    examples: &examples,
                },
            );
            let reasoning = self
                .complete(reasoning_prompt)
                .await
                .with_context(|| format!("reasoning failed at step {step_index}"))?;

            let action_prompt = self.render_prompt(
                &templates.action,
                &PromptContext {
                    goal,
                    plan: &plan,
                    observation: &observation,
                    reasoning: &reasoning,
                    history: &steps,
                    examples: &examples,
                },
            );
            let action = self
                .complete(action_prompt)
                .await
                .with_context(|| format!("action selection failed at step {step_index}"))?;
            debug!(step = step_index, action = %action, "action chosen");

            let step = Step::new(std::mem::take(&mut observation), reasoning, action);
            if let Some(callback) = &self.on_step {
                callback(step_index, &step);
            }
            let response = env
                .step(&step.action)
                .await
                .with_context(|| format!("environment step {step_index} failed"))?;
            steps.push(step);

            success = response.success;
            observation = response.observation;
            if response.done {
                break;
            }
        }

        // Done
        retriever.record_episode_result(success).await?;
        info!(
            goal = %goal,
            steps = steps.len(),
            success,
            "episode finished"
        );
        Ok(Trajectory::new(goal, plan, steps, success))
    }

    fn render_prompt(&self, template: &str, ctx: &PromptContext<'_>) -> String {
        let limits = &self.config.limits;
        let goal = truncate_field(ctx.goal, limits.goal);
        let plan = truncate_field(ctx.plan, limits.plan);
        let observation = truncate_field(ctx.observation, limits.observation);
        let reasoning = truncate_field(ctx.reasoning, limits.reasoning);
        let history = format_history(ctx.history, &self.config.history);
        let examples = format_examples(ctx.examples, &self.config.examples);

        render(
            template,
            &[
                (PLACEHOLDER_GOAL, &goal),
                (PLACEHOLDER_PLAN, &plan),
                (PLACEHOLDER_OBSERVATION, &observation),
                (PLACEHOLDER_REASONING, &reasoning),
                (PLACEHOLDER_HISTORY, &history),
                (PLACEHOLDER_EXAMPLES, &examples),
            ],
        )
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let reply = self.backend.complete(&[ChatMessage::user(prompt)]).await?;
        Ok(reply.trim().to_string())
    }
}
