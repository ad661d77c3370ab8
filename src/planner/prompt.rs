//! Prompt assembly for the planner, replanner and step executor

use crate::models::{render_history, render_numbered, StepRecord};
use chrono::{Datelike, Utc};

pub const ANALYST_SYSTEM_PROMPT: &str = r#"You are a professional financial analyst.

Guidelines:
- Provide accurate and educational financial information
- Be structured and concise
- Emphasize research and risk awareness
- Use professional financial language"#;

/// Planning instructions for a fresh objective
pub fn planner_prompt(objective: &str, tool_names: &[&str]) -> String {
    let tools = tool_names
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"For the given objective, come up with a detailed step-by-step plan tailored for financial analysis and recommendations. Your plan should include:
1. Understanding the user's question clearly.
2. Identifying needed information, such as stock prices, financial metrics, market trends, or calculations.
3. Selecting tools from: {tools}.
4. Planning tool usage sequence.
5. Synthesizing information for response.
6. Assessing risks, ensuring alignment with high risk tolerance and short-term horizon.
This plan should involve individual tasks, that if executed correctly will yield the correct answer. Do not add any superfluous steps. The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.
7. Whenever the user mentions documents or files, use `retrieve_from_documents`.
8. Whenever the user mentions stock price or financial metrics, use `stock_price_retrieval` and `stock_financial_metrics_retrieval`.
9. Whenever the user mentions a calculation, use `calculator`.
10. Whenever the user mentions a search, use `tavily_search`.
11. Current year is {year}.

Return ONLY valid JSON, no explanation text:
{{
  "steps": ["<self-contained task>", "..."],
  "ui_steps": ["<label of at most 5 words>", "..."]
}}
"ui_steps" must have exactly one entry per step, in the same order.

OBJECTIVE:
{objective}
"#,
        tools = tools,
        year = Utc::now().year(),
        objective = objective,
    )
}

/// Replanning instructions after a step completes
pub fn replanner_prompt(objective: &str, plan: &[String], history: &[StepRecord]) -> String {
    let plan = if plan.is_empty() {
        "All planned steps have been executed.".to_string()
    } else {
        render_numbered(plan)
    };

    format!(
        r#"For the given objective, come up with a simple step by step plan. This plan should involve individual tasks, that if executed correctly will yield the correct answer. Do not add any superfluous steps. The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.

Your objective was this:
{objective}

Your remaining plan is this:
{plan}

You have currently done the following steps:
{past_steps}

Update your plan accordingly. If no more steps are needed and you can return to the user, then respond with that. Otherwise, fill out the plan. Only add steps to the plan that still NEED to be done. Do not return previously done steps as part of the plan.
When you respond to the user, make sure the final answer is properly formatted, easy to understand, and summarizes the context of everything from the planning and past steps.

Return ONLY valid JSON in one of these two forms:
{{"action": {{"response": "<final answer for the user>"}}}}
{{"action": {{"steps": ["<remaining task>", "..."], "ui_steps": ["<label of at most 5 words>", "..."]}}}}
"#,
        objective = objective,
        plan = plan,
        past_steps = render_history(history),
    )
}

/// Instructions for executing the head task of the plan
pub fn executor_prompt(
    objective: &str,
    plan: &[String],
    history: &[StepRecord],
    task: &str,
) -> String {
    format!(
        r#"Original user input: {objective}

Full plan:
{plan}

Past steps executed:
{past_steps}

You are tasked with executing step 1: {task}. Use the original input and past steps to maintain context.
Call the available tools when you need data or arithmetic. When you are done, reply with the result of this step only."#,
        objective = objective,
        plan = render_numbered(plan),
        past_steps = render_history(history),
        task = task,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_prompt_carries_context() {
        let plan = vec![
            "Retrieve AAPL financial metrics".to_string(),
            "Summarize valuation".to_string(),
        ];
        let history = vec![StepRecord {
            task: "Retrieve AAPL price".to_string(),
            result: "$190.12".to_string(),
        }];

        let prompt = executor_prompt(
            "Is AAPL expensive?",
            &plan,
            &history,
            "Retrieve AAPL financial metrics",
        );

        assert!(prompt.contains("Original user input: Is AAPL expensive?"));
        assert!(prompt.contains("1. Retrieve AAPL financial metrics\n2. Summarize valuation"));
        assert!(prompt.contains("Retrieve AAPL price: $190.12"));
        assert!(prompt.contains("executing step 1: Retrieve AAPL financial metrics"));
    }

    #[test]
    fn test_replanner_prompt_without_history() {
        let prompt = replanner_prompt("objective", &["next".to_string()], &[]);
        assert!(prompt.contains("None yet"));
        assert!(prompt.contains("1. next"));
    }

    #[test]
    fn test_planner_prompt_lists_tools() {
        let prompt = planner_prompt("Compare AAPL and MSFT", &["calculator", "tavily_search"]);
        assert!(prompt.contains("`calculator`, `tavily_search`"));
        assert!(prompt.contains("Compare AAPL and MSFT"));
        assert!(prompt.contains(&Utc::now().year().to_string()));
    }
}
