use phaseflow_core::Task;

use crate::core::PhaseContext;

pub struct PhasePrompts;

impl PhasePrompts {
    pub fn analysis(task: &Task, context: &PhaseContext) -> String {
        format!(
            r#"You are analyzing a development task. Produce an implementation analysis.

## Task
**Title:** {title}
**Description:** {description}
**Branch:** {branch}

## Required Output
Respond with the analysis itself. It should include:
1. Technical analysis
2. Files to modify/create
3. User stories, one per line, numbered
4. Potential risks

Do NOT implement anything yet. Only analyze."#,
            title = task.title,
            description = task.description,
            branch = context.branch_name,
        )
    }

    pub fn development(task: &Task, context: &PhaseContext) -> String {
        let analysis = match context.analysis.as_deref() {
            Some(analysis) => format!("## Analysis\n{}", analysis),
            None => "## Analysis\nNone available. Analyze the task requirements first.".to_string(),
        };

        format!(
            r#"Implement the following task.

## Task
**Title:** {title}
**Description:** {description}

{analysis}

## Instructions
1. Work on branch `{branch}` in the current directory
2. Implement each story thoroughly
3. Write tests if applicable
4. Do not open a pull request

When done, finish your reply with a line of the form:
STORIES: <completed>/<total>"#,
            title = task.title,
            description = task.description,
            analysis = analysis,
            branch = context.branch_name,
        )
    }

    pub fn judge(task: &Task, context: &PhaseContext) -> String {
        format!(
            r#"Review the work done on branch `{branch}` against base `{base}` for task: {title}

## Task Description
{description}

## Review Criteria
1. Correctness - does it solve the task?
2. Code quality and style
3. Tests - are they adequate?
4. Security concerns

## Output
If approved, respond with: APPROVED
If changes needed, respond with: CHANGES_REQUESTED followed by what needs fixing."#,
            branch = context.branch_name,
            base = context.base_branch,
            title = task.title,
            description = task.description,
        )
    }

    pub fn fix_issues(task: &Task, feedback: &str) -> String {
        format!(
            r#"Fix the issues identified in the review for task: {title}

## Review Feedback
{feedback}

## Instructions
1. Address each issue mentioned
2. Update tests if needed
3. Ensure the fix is complete

Fix the issues now."#,
            title = task.title,
            feedback = feedback
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Task, PhaseContext) {
        let task = Task::new("Test Task", "A test description");
        let context = PhaseContext::for_task(&task, "/repo", "main");
        (task, context)
    }

    #[test]
    fn test_analysis_prompt_contains_task_info() {
        let (task, context) = sample();
        let prompt = PhasePrompts::analysis(&task, &context);

        assert!(prompt.contains(&task.title));
        assert!(prompt.contains(&task.description));
        assert!(prompt.contains(&context.branch_name));
    }

    #[test]
    fn test_development_prompt_includes_analysis() {
        let (task, context) = sample();
        let context = context.with_analysis("1. Add the login form");
        let prompt = PhasePrompts::development(&task, &context);

        assert!(prompt.contains("Add the login form"));
        assert!(prompt.contains("STORIES: <completed>/<total>"));
    }

    #[test]
    fn test_development_prompt_without_analysis() {
        let (task, context) = sample();
        let prompt = PhasePrompts::development(&task, &context);
        assert!(prompt.contains("None available"));
    }

    #[test]
    fn test_judge_prompt_names_verdicts() {
        let (task, context) = sample();
        let prompt = PhasePrompts::judge(&task, &context);

        assert!(prompt.contains("APPROVED"));
        assert!(prompt.contains("CHANGES_REQUESTED"));
        assert!(prompt.contains("main"));
    }

    #[test]
    fn test_fix_issues_contains_feedback() {
        let (task, _) = sample();
        let feedback = "Error handling is missing";
        let prompt = PhasePrompts::fix_issues(&task, feedback);

        assert!(prompt.contains(&task.title));
        assert!(prompt.contains(feedback));
    }
}
