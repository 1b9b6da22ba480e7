//! `lca`: list, inspect and trigger content actions from the command line.
//!
//! ```bash
//! lca -p /home/user/photo.jpg          # applicable actions
//! lca -i gallery /home/user/photo.jpg  # trigger one of them
//! lca -d mailto:someone@example.com    # trigger the default
//! lca -c urn:uuid:1234                 # association keys of a target
//! lca -a x-condition/image             # default action of a key
//! lca -s gallery image/*               # set it
//! lca -H "call 555 1234 now"           # actionable spans in text
//! ```

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use contentaction::config::Config;
use contentaction::logging::LoggerBuilder;
use contentaction::{ActionDescriptor, ContentActions, Target};

const EXIT_OK: u8 = 0;
const EXIT_USAGE: u8 = 1;
const EXIT_BAD_ARGS: u8 = 2;
const EXIT_NOT_APPLICABLE: u8 = 3;
const EXIT_NO_DEFAULT: u8 = 4;
const EXIT_NO_CLASS_DEFAULT: u8 = 5;
const EXIT_SET_DEFAULT_FAILED: u8 = 6;
const EXIT_TRIGGER_FAILED: u8 = 7;

#[derive(Parser)]
#[command(name = "lca")]
#[command(version)]
#[command(about = "List and trigger the actions registered for URIs, objects and text")]
#[command(after_help = "Return values:
  0   success
  1   no arguments given
  2   problem with command arguments
  3   tried to invoke an action not applicable for the given URIs
  4   no default action exists for the given URIs
  5   no default action exists for the given class
  6   setting a default action for the given class failed
  7   triggering the action failed")]
#[command(group(
    ArgGroup::new("mode").args([
        "print",
        "invoke",
        "invoke_default",
        "classes",
        "default",
        "set_default",
        "highlight",
    ])
))]
struct Cli {
    /// Print the applicable actions
    #[arg(short, long)]
    print: bool,

    /// Invoke the named action
    #[arg(short, long, value_name = "NAME")]
    invoke: Option<String>,

    /// Invoke the default action
    #[arg(short = 'd', long = "invoke-default", alias = "invokedefault")]
    invoke_default: bool,

    /// Print the association keys of the first URI
    #[arg(short, long)]
    classes: bool,

    /// Print the default action for an association key
    #[arg(short = 'a', long)]
    default: bool,

    /// Set the default action for an association key
    #[arg(short, long = "set-default", alias = "setdefault", value_name = "NAME")]
    set_default: Option<String>,

    /// Print the actionable spans of the text given as arguments
    #[arg(short = 'H', long)]
    highlight: bool,

    /// Config file (default: $CONTENTACTION_CONFIG or the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log to stderr as well
    #[arg(short, long)]
    verbose: bool,

    /// URIs, paths, an association key (-a, -s) or text (-H)
    #[arg(value_name = "URI")]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return ExitCode::from(code),
    };

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("lca: {e:#}");
            ExitCode::from(EXIT_BAD_ARGS)
        }
    }
}

/// Parse `argv` (program name first) or return the exit code to stop with.
fn parse_cli<I, T>(argv: I) -> Result<Cli, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    if argv.len() <= 1 {
        eprintln!("Usage: lca [OPTIONS] URI [URIS...]  (see lca --help)");
        return Err(EXIT_USAGE);
    }

    Cli::try_parse_from(argv).map_err(|e| {
        let _ = e.print();
        match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_USAGE,
            _ => EXIT_BAD_ARGS,
        }
    })
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = Config::load_at(cli.config.as_deref()).await?;

    let _guard = match LoggerBuilder::new()
        .with_config(config.log.clone())
        .with_stderr(cli.verbose)
        .build()
    {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("lca: logging disabled: {e:#}");
            None
        }
    };

    let actions = ContentActions::from_config(&config).await?;
    execute(&cli, &actions, &mut io::stdout().lock()).await
}

/// Run the selected mode against `actions`, writing results to `out`.
async fn execute(cli: &Cli, actions: &ContentActions, out: &mut impl Write) -> anyhow::Result<u8> {
    if cli.args.is_empty() {
        eprintln!("no URIs given");
        return Ok(EXIT_BAD_ARGS);
    }

    let targets: Vec<Target> = cli.args.iter().map(|a| Target::from_arg(a)).collect();

    if cli.print {
        for action in actions.resolve_all(&targets).await {
            writeln!(out, "{}", action.id)?;
        }
        return Ok(EXIT_OK);
    }

    if let Some(name) = &cli.invoke {
        let applicable = actions.resolve_all(&targets).await;
        let Some(action) = applicable.iter().find(|a| &a.id == name) else {
            eprintln!("action '{name}' is not applicable");
            return Ok(EXIT_NOT_APPLICABLE);
        };
        return Ok(trigger(actions, action, &targets).await);
    }

    if cli.invoke_default {
        let Some(action) = actions.default_action_all(&targets).await? else {
            eprintln!("no default action for the given URIs");
            return Ok(EXIT_NO_DEFAULT);
        };
        return Ok(trigger(actions, &action, &targets).await);
    }

    if cli.classes {
        for class in actions.classes_of(&targets[0]).await {
            writeln!(out, "{class}")?;
        }
        return Ok(EXIT_OK);
    }

    if cli.default {
        let key = &cli.args[0];
        return Ok(match actions.default_for_key(key).await {
            Ok(Some(id)) => {
                writeln!(out, "{id}")?;
                EXIT_OK
            }
            Ok(None) => {
                eprintln!("no default action for: {key}");
                EXIT_NO_CLASS_DEFAULT
            }
            Err(e) => {
                eprintln!("no default action for: {key}: {e}");
                EXIT_NO_CLASS_DEFAULT
            }
        });
    }

    if let Some(name) = &cli.set_default {
        let key = &cli.args[0];
        return Ok(match actions.set_default(key, name).await {
            Ok(()) => EXIT_OK,
            Err(e) => {
                eprintln!("failed to set default action {name} for a class {key}: {e}");
                EXIT_SET_DEFAULT_FAILED
            }
        });
    }

    if cli.highlight {
        let text = cli.args.join(" ");
        for m in actions.highlight(&text) {
            let ids: Vec<&str> = m.actions.iter().map(|a| a.id.as_str()).collect();
            writeln!(out, "{} {} {} {}", m.start, m.length, m.text, ids.join(" "))?;
        }
        return Ok(EXIT_OK);
    }

    eprintln!("no mode given (see lca --help)");
    Ok(EXIT_USAGE)
}

async fn trigger(
    actions: &ContentActions,
    action: &ActionDescriptor,
    targets: &[Target],
) -> u8 {
    match actions.trigger_on(action, targets).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("{e}");
            EXIT_TRIGGER_FAILED
        }
    }
}
