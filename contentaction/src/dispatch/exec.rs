//! src/dispatch/exec.rs
//! ============================================================================
//! # Exec command templates
//!
//! Commands are desktop-entry style templates. They are split into an argv
//! array and never handed to a shell, so a target can not inject extra
//! arguments or commands.
//!
//! Field codes:
//! - `%u` `%f`: the first target
//! - `%U` `%F`: every target, one argv element each
//! - `%%`: a literal `%`
//! - any other code (`%i`, `%c`, `%k`, ...) is removed
//!
//! A template without any target field code gets the targets appended.

use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// Split a command template into words. Double quotes group words and
/// support `\"`, `\\`, `` \` `` and `\$` escapes.
pub fn tokenize(template: &str) -> Result<Vec<String>, String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e @ ('"' | '\\' | '`' | '$')) => current.push(e),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err("unterminated escape in quotes".to_string()),
                        },
                        Some(other) => current.push(other),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }

            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }

            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    match words.first() {
        None => Err("empty command".to_string()),
        Some(program) if program.is_empty() => Err("empty program name".to_string()),
        Some(_) => Ok(words),
    }
}

/// Build the argv for `template` applied to `targets`.
pub fn expand(template: &str, targets: &[String]) -> Result<Vec<String>, String> {
    let words = tokenize(template)?;

    let mut argv: Vec<String> = Vec::with_capacity(words.len() + targets.len());
    let mut consumed_targets = false;

    for word in words {
        // Standalone list codes expand to separate arguments.
        if matches!(word.as_str(), "%U" | "%F") {
            argv.extend(targets.iter().cloned());
            consumed_targets = true;
            continue;
        }

        let mut out = String::with_capacity(word.len());
        let mut had_code = false;
        let mut chars = word.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            match chars.next() {
                Some('%') => out.push('%'),
                Some('u' | 'f') => {
                    if let Some(first) = targets.first() {
                        out.push_str(first);
                    }
                    consumed_targets = true;
                    had_code = true;
                }
                Some('U' | 'F') => {
                    out.push_str(&targets.join(" "));
                    consumed_targets = true;
                    had_code = true;
                }
                Some(_) | None => had_code = true,
            }
        }

        // A word that was only field codes expanding to nothing disappears;
        // a literal empty argument stays.
        if !(out.is_empty() && had_code) {
            argv.push(out);
        }
    }

    if !consumed_targets {
        argv.extend(targets.iter().cloned());
    }

    if argv.is_empty() {
        return Err("command expands to nothing".to_string());
    }

    Ok(argv)
}

/// Starts processes without waiting for them.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, argv: &[String]) -> io::Result<()>;
}

/// Spawns children with null stdio in their own process group. The child
/// is never awaited; the runtime reaps it when it exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&self, argv: &[String]) -> io::Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        debug!("Spawned {} (pid {:?})", program, child.id());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_tokenize_honors_quotes() {
        assert_eq!(
            tokenize(r#"/usr/bin/app --title "My \"Photos\"" %U"#).unwrap(),
            vec!["/usr/bin/app", "--title", "My \"Photos\"", "%U"]
        );
        assert_eq!(tokenize(r#"app """#).unwrap(), vec!["app", ""]);
        assert!(tokenize("app \"open").is_err());
        assert!(tokenize("   ").is_err());
    }

    #[test]
    fn test_list_codes_expand_to_separate_args() {
        let argv = expand("/usr/bin/mail %U", &targets(&["mailto:a@b.com", "mailto:c@d.com"]))
            .unwrap();
        assert_eq!(argv, vec!["/usr/bin/mail", "mailto:a@b.com", "mailto:c@d.com"]);
    }

    #[test]
    fn test_empty_quoted_argument_kept_after_target_code() {
        assert_eq!(
            expand(r#"app %U """#, &targets(&["a"])).unwrap(),
            vec!["app", "a", ""]
        );
        assert_eq!(
            expand(r#"app %f "" %i"#, &targets(&[])).unwrap(),
            vec!["app", ""]
        );
    }

    #[test]
    fn test_single_codes_take_first_target() {
        let argv = expand("viewer --file=%f", &targets(&["/a.png", "/b.png"])).unwrap();
        assert_eq!(argv, vec!["viewer", "--file=/a.png"]);
    }

    #[test]
    fn test_targets_are_never_split_or_interpreted() {
        let argv = expand("open %u", &targets(&["file:///tmp/x; rm -rf ~"])).unwrap();
        assert_eq!(argv, vec!["open", "file:///tmp/x; rm -rf ~"]);
    }

    #[test]
    fn test_deprecated_codes_dropped_and_percent_escaped() {
        let argv = expand("app %i --ratio 50%% %k %F", &targets(&["/a"])).unwrap();
        assert_eq!(argv, vec!["app", "--ratio", "50%", "/a"]);
    }

    #[test]
    fn test_targets_appended_without_field_codes() {
        let argv = expand("/usr/bin/editor --new-window", &targets(&["/a.txt"])).unwrap();
        assert_eq!(argv, vec!["/usr/bin/editor", "--new-window", "/a.txt"]);
    }

    #[test]
    fn test_no_targets_removes_codes() {
        let argv = expand("app %U", &[]).unwrap();
        assert_eq!(argv, vec!["app"]);
    }
}
