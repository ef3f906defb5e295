/// Formats the requirement prompt shared by every generation phase: a bold
/// title heading with the summary bullet, a blank line, then the description
/// heading with its indented bullet.
pub fn build_prompt(summary: &str, description: &str) -> String {
    format!(
        "**Requirement Title**\n- {summary}\n\n**Requirement Description**\n - {description}"
    )
}
