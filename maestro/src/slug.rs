//! Task slugs: kebab-cased command head plus a timestamp, scoping the log
//! entry indices of one worker command.

use chrono::Utc;

/// Characters of the command considered for the slug base.
const SLUG_HEAD: usize = 50;

/// Derives a task slug from a command: the first 50 characters lowercased
/// and kebab-cased, suffixed with a `%Y%m%d-%H%M%S` stamp.
pub fn task_slug(command: &str) -> String {
    let head: String = command.chars().take(SLUG_HEAD).collect();
    let mut base = String::with_capacity(head.len());
    let mut last_dash = true;
    for c in head.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            base.push(c);
            last_dash = false;
        } else if !last_dash {
            base.push('-');
            last_dash = true;
        }
    }
    let base = base.trim_matches('-');
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    if base.is_empty() {
        format!("task-{stamp}")
    } else {
        format!("{base}-{stamp}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_cases_the_command_head() {
        let slug = task_slug("Say hi to the team!");
        assert!(slug.starts_with("say-hi-to-the-team-"));
    }

    #[test]
    fn collapses_runs_of_non_alphanumerics() {
        let slug = task_slug("fix   the -- build!!");
        assert!(slug.starts_with("fix-the-build-"));
    }

    #[test]
    fn caps_the_base_at_fifty_characters() {
        let long = "a".repeat(200);
        let slug = task_slug(&long);
        let base = slug.rsplitn(3, '-').nth(2).unwrap();
        assert_eq!(base.len(), 50);
    }

    #[test]
    fn empty_command_still_produces_a_slug() {
        let slug = task_slug("!!!");
        assert!(slug.starts_with("task-"));
    }
}
