//! Prompt augmentation and argv construction (spec §4.B, §6).

use synapse_contracts::ModelPreference;

/// Fixed prohibition banner prepended byte-for-byte to every outbound
/// prompt (spec §6: "the exact wording is part of the external contract").
pub const PROHIBITION_BANNER: &str = "\
POLICY: you must not call any external LLM API directly. Any work that \
requires another model invocation must be requested back through the \
message bus and awaited as a normal response.\n\n";

/// Prepend the prohibition banner to `prompt` (spec §4.B "Prompt
/// augmentation").
pub fn augment_prompt(prompt: &str) -> String {
    format!("{PROHIBITION_BANNER}{prompt}")
}

/// Build argv per spec §4.B "Argument construction": materialized file
/// paths (caller order), `--dangerously-skip-permissions`, `--print`,
/// optional `--model`/`--fallback-model`, and `--continue` when dispatching
/// the Execute-error continuation sub-protocol. The augmented prompt itself
/// is not part of argv — it is written to stdin by the caller.
pub fn build_argv(
    materialized_files: &[String],
    model_preference: Option<&ModelPreference>,
    continuation: bool,
) -> Vec<String> {
    let mut argv = Vec::with_capacity(materialized_files.len() + 5);
    argv.extend(materialized_files.iter().cloned());
    argv.push("--dangerously-skip-permissions".to_string());
    argv.push("--print".to_string());

    if let Some(pref) = model_preference {
        if let Some(primary) = &pref.primary {
            argv.push("--model".to_string());
            argv.push(primary.clone());
        }
        if let Some(fallback) = &pref.fallback {
            argv.push("--fallback-model".to_string());
            argv.push(fallback.clone());
        }
    }

    if continuation {
        argv.push("--continue".to_string());
    }

    argv
}

/// Stdin text for the Execute-error continuation sub-protocol (spec §4.B
/// "Recovery sub-protocol").
pub const CONTINUATION_DIRECTIVE: &str = "please continue/please return your result";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn augmented_prompt_carries_banner_byte_for_byte() {
        let augmented = augment_prompt("do the thing");
        assert!(augmented.starts_with(PROHIBITION_BANNER));
        assert!(augmented.ends_with("do the thing"));
    }

    #[test]
    fn argv_orders_files_then_flags_then_model_preference() {
        let pref = ModelPreference {
            primary: Some("opus".to_string()),
            fallback: Some("sonnet".to_string()),
        };
        let argv = build_argv(&["a.txt".to_string(), "b.txt".to_string()], Some(&pref), false);
        assert_eq!(
            argv,
            vec![
                "a.txt",
                "b.txt",
                "--dangerously-skip-permissions",
                "--print",
                "--model",
                "opus",
                "--fallback-model",
                "sonnet",
            ]
        );
    }

    #[test]
    fn continuation_appends_continue_flag() {
        let argv = build_argv(&[], None, true);
        assert_eq!(
            argv,
            vec!["--dangerously-skip-permissions", "--print", "--continue"]
        );
    }
}
