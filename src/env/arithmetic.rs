//! A deterministic arithmetic environment.
//!
//! Goals take one of three forms:
//! - `add A and B`
//! - `subtract A from B` (answer `B - A`)
//! - `multiply A and B`
//!
//! The agent answers with `answer:<n>`. A correct answer ends the episode
//! successfully, a wrong one ends it as a failure, and anything else earns a
//! hint without ending the episode. Useful for exercising the whole
//! train/run pipeline with no external services.

use anyhow::Result;
use tracing::debug;

use super::traits::{EnvResponse, Environment};

/// Prefix every answer action must carry.
pub const ANSWER_PREFIX: &str = "answer:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
}

/// A parsed arithmetic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticTask {
    op: Operation,
    lhs: i64,
    rhs: i64,
}

impl ArithmeticTask {
    /// Parse a goal such as `"add 9 and 1"`. Case and trailing punctuation
    /// are ignored.
    pub fn parse(goal: &str) -> Option<Self> {
        let lowered = goal.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split_whitespace()
            .map(|t| t.trim_end_matches(['.', '?', '!', ',']))
            .collect();

        let (op, a, joiner, b) = match tokens.as_slice() {
            [op, a, joiner, b] => (*op, *a, *joiner, *b),
            _ => return None,
        };
        let a: i64 = a.parse().ok()?;
        let b: i64 = b.parse().ok()?;

        let (op, lhs, rhs) = match (op, joiner) {
            ("add", "and") => (Operation::Add, a, b),
            ("multiply", "and") => (Operation::Multiply, a, b),
            // "subtract A from B" means B - A.
            ("subtract", "from") => (Operation::Subtract, b, a),
            _ => return None,
        };
        Some(Self { op, lhs, rhs })
    }

    /// The expected answer, or `None` on overflow.
    pub fn answer(&self) -> Option<i64> {
        match self.op {
            Operation::Add => self.lhs.checked_add(self.rhs),
            Operation::Subtract => self.lhs.checked_sub(self.rhs),
            Operation::Multiply => self.lhs.checked_mul(self.rhs),
        }
    }
}

/// Deterministic local environment over [`ArithmeticTask`] goals.
#[derive(Debug, Clone, Default)]
pub struct ArithmeticEnv {
    task: Option<ArithmeticTask>,
    goal: String,
    steps_taken: usize,
    done: bool,
}

impl ArithmeticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Environment for ArithmeticEnv {
    async fn reset(&mut self, goal: &str) -> Result<String> {
        let task = ArithmeticTask::parse(goal).ok_or_else(|| {
            anyhow::anyhow!(
                "unsupported arithmetic goal {goal:?}; expected \"add A and B\", \
                 \"subtract A from B\" or \"multiply A and B\""
            )
        })?;
        self.task = Some(task);
        self.goal = goal.to_string();
        self.steps_taken = 0;
        self.done = false;

        debug!(goal = %goal, "arithmetic env reset");
        Ok(format!(
            "Task: {goal}. Respond with {ANSWER_PREFIX}<number>."
        ))
    }

    async fn step(&mut self, action: &str) -> Result<EnvResponse> {
        let Some(task) = self.task else {
            anyhow::bail!("step called before reset");
        };
        if self.done {
            anyhow::bail!("cannot step in a terminated episode");
        }
        self.steps_taken += 1;

        let action = action.trim();
        let Some(raw) = action.strip_prefix(ANSWER_PREFIX) else {
            return Ok(EnvResponse::ongoing(format!(
                "Unrecognised action {action:?}. Reply with {ANSWER_PREFIX}<number> to solve: {}",
                self.goal
            )));
        };
        let Ok(given) = raw.trim().parse::<i64>() else {
            return Ok(EnvResponse::ongoing(format!(
                "Could not read a number from {raw:?}. Reply with {ANSWER_PREFIX}<number>."
            )));
        };

        self.done = true;
        let success = task.answer() == Some(given);
        debug!(given, success, "arithmetic env answered");
        if success {
            Ok(EnvResponse::finished(format!("Correct: {given}."), true))
        } else {
            Ok(EnvResponse::finished(format!("Incorrect: {given}."), false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_goals() {
        assert_eq!(ArithmeticTask::parse("add 9 and 1").unwrap().answer(), Some(10));
        assert_eq!(
            ArithmeticTask::parse("Subtract 3 from 10.").unwrap().answer(),
            Some(7)
        );
        assert_eq!(
            ArithmeticTask::parse("multiply -4 and 5").unwrap().answer(),
            Some(-20)
        );
        assert!(ArithmeticTask::parse("divide 4 by 2").is_none());
        assert!(ArithmeticTask::parse("add 4").is_none());
        assert!(ArithmeticTask::parse("add four and 2").is_none());
    }

    #[tokio::test]
    async fn test_correct_answer_succeeds() {
        let mut env = ArithmeticEnv::new();
        let obs = env.reset("add 9 and 1").await.unwrap();
        assert!(obs.contains("add 9 and 1"));

        let resp = env.step("answer:10").await.unwrap();
        assert!(resp.done);
        assert!(resp.success);
        assert!(env.is_done());
        assert!(env.step("answer:10").await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_answer_fails() {
        let mut env = ArithmeticEnv::new();
        env.reset("multiply 3 and 4").await.unwrap();
        let resp = env.step(" answer: 11 ").await.unwrap();
        assert!(resp.done);
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn test_other_actions_get_a_hint() {
        let mut env = ArithmeticEnv::new();
        env.reset("subtract 2 from 5").await.unwrap();

        let resp = env.step("think harder").await.unwrap();
        assert!(!resp.done);
        assert!(resp.observation.contains(ANSWER_PREFIX));

        let resp = env.step("answer:three").await.unwrap();
        assert!(!resp.done);

        let resp = env.step("answer:3").await.unwrap();
        assert!(resp.success);
        assert_eq!(env.steps_taken(), 3);
    }

    #[tokio::test]
    async fn test_reset_rejects_unknown_goal_and_step_requires_reset() {
        let mut env = ArithmeticEnv::new();
        assert!(env.step("answer:1").await.is_err());
        assert!(env.reset("water the plants").await.is_err());
    }
}
