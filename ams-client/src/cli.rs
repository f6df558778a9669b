//! Command-line parsing for the `ams` binary.

use ams_core::AlarmQuery;

use crate::error::ClientError;

pub const USAGE: &str = "ams [--config <path>] [--threshold N] [--top-n N] [--fresh] \
<kpis|sources|floods|bad-actors|priorities|conditions|alarms|refresh|regenerate|ask <query>>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Kpis,
    Sources,
    Floods,
    BadActors,
    Priorities,
    Conditions,
    Alarms,
    Refresh,
    Regenerate,
    Ask(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub query: AlarmQuery,
    /// Skip both cache tiers for this call.
    pub fresh: bool,
}

impl Invocation {
    /// Parse arguments without the program name.
    pub fn parse<I>(args: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut query = AlarmQuery::new();
        let mut fresh = false;
        let mut words = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    args.next().ok_or_else(|| usage("--config needs a path"))?;
                }
                "--threshold" => query = query.threshold(number(&mut args, "--threshold")?),
                "--top-n" => query = query.top_n(number(&mut args, "--top-n")?),
                "--fresh" => fresh = true,
                flag if flag.starts_with("--") => {
                    return Err(usage(&format!("unknown flag {}", flag)));
                }
                _ => words.push(arg),
            }
        }

        let mut words = words.into_iter();
        let name = words.next().ok_or_else(|| usage("missing command"))?;
        let command = match name.as_str() {
            "kpis" => Command::Kpis,
            "sources" => Command::Sources,
            "floods" => Command::Floods,
            "bad-actors" => Command::BadActors,
            "priorities" => Command::Priorities,
            "conditions" => Command::Conditions,
            "alarms" => Command::Alarms,
            "refresh" => Command::Refresh,
            "regenerate" => Command::Regenerate,
            "ask" => {
                let text = words.by_ref().collect::<Vec<_>>().join(" ");
                if text.trim().is_empty() {
                    return Err(usage("ask needs a question"));
                }
                Command::Ask(text)
            }
            other => return Err(usage(&format!("unknown command {}", other))),
        };

        if let Some(extra) = words.next() {
            return Err(usage(&format!("unexpected argument {}", extra)));
        }

        Ok(Self {
            command,
            query,
            fresh,
        })
    }
}

fn usage(reason: &str) -> ClientError {
    ClientError::Usage(format!("{}\n{}", reason, USAGE))
}

fn number(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<u32, ClientError> {
    let raw = args
        .next()
        .ok_or_else(|| usage(&format!("{} needs a value", flag)))?;
    raw.parse()
        .map_err(|_| usage(&format!("{} expects a number, got {}", flag, raw)))
}
