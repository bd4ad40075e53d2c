use anyhow::Result;
use chanbridge_core::{init_logging, AppDirs, Config, Invocation, Method, StringMap, Value};
use chanbridge_plugin::{ChannelServer, Dispatcher, PluginRequest, PROTOCOL_VERSION};
use clap::{Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const BUILTIN_METHODS: &[&str] = &["describe", "echo"];

#[derive(Debug, Parser)]
#[command(name = "chanbridge", version, about = "Typed method channel for plugins")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the built-in diagnostic methods over stdin/stdout
    Serve(ServeCommand),
    /// Print a request line for the given invocation
    Call(CallCommand),
}

#[derive(Debug, Parser, Clone)]
struct ServeCommand {
    /// Channel name override (takes precedence over config)
    #[arg(long)]
    channel: Option<String>,
}

#[derive(Debug, Parser, Clone)]
struct CallCommand {
    /// Method name to invoke
    method: String,
    /// Request id used for correlation
    #[arg(long, default_value_t = 1)]
    id: u64,
    /// Integer argument
    #[arg(long = "int", value_name = "KEY=VALUE")]
    ints: Vec<String>,
    /// Float argument
    #[arg(long = "float", value_name = "KEY=VALUE")]
    floats: Vec<String>,
    /// String argument
    #[arg(long = "string", value_name = "KEY=VALUE")]
    strings: Vec<String>,
    /// Boolean argument
    #[arg(long = "bool", value_name = "KEY=VALUE")]
    bools: Vec<String>,
}

/// Value kind selected by the `--int`/`--float`/`--string`/`--bool` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Int,
    Float,
    String,
    Bool,
}

impl ArgKind {
    fn as_str(&self) -> &'static str {
        match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::String => "string",
            ArgKind::Bool => "bool",
        }
    }

    /// Parses `text` as this kind. Floats must be finite to have a wire form.
    fn parse(self, text: &str) -> Option<Value> {
        match self {
            ArgKind::Int => text.trim().parse().ok().map(Value::Int),
            ArgKind::Float => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float),
            ArgKind::String => Some(Value::String(text.to_string())),
            ArgKind::Bool => text.trim().parse().ok().map(Value::Bool),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum ArgumentError {
    #[error("argument `{0}` is not of the form KEY=VALUE")]
    MissingSeparator(String),
    #[error("argument key must not be empty in `{0}`")]
    EmptyKey(String),
    #[error("argument `{key}` given more than once")]
    Duplicate { key: String },
    #[error("argument `{key}`: `{value}` is not a valid {kind}")]
    Parse {
        key: String,
        value: String,
        kind: ArgKind,
    },
}

impl CallCommand {
    fn invocation(&self) -> Result<Invocation, ArgumentError> {
        let mut invocation = Invocation::new(self.method.clone());
        let groups: [(&[String], ArgKind); 4] = [
            (&self.ints, ArgKind::Int),
            (&self.floats, ArgKind::Float),
            (&self.strings, ArgKind::String),
            (&self.bools, ArgKind::Bool),
        ];

        for (raw_args, kind) in groups {
            for raw in raw_args {
                let (key, text) = split_pair(raw)?;
                if invocation.arguments().contains(key) {
                    return Err(ArgumentError::Duplicate { key: key.to_string() });
                }
                let value = kind.parse(text).ok_or_else(|| ArgumentError::Parse {
                    key: key.to_string(),
                    value: text.to_string(),
                    kind,
                })?;
                invocation = invocation.with_argument(key, value);
            }
        }

        Ok(invocation)
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str), ArgumentError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ArgumentError::MissingSeparator(raw.to_string()))?;
    if key.trim().is_empty() {
        return Err(ArgumentError::EmptyKey(raw.to_string()));
    }
    Ok((key.trim(), value))
}

/// Methods every chanbridge channel answers, handy for checking a deployment.
fn builtin_dispatcher(channel: &str) -> Dispatcher {
    let channel_name = channel.to_string();
    Dispatcher::new(channel)
        .with_handler("describe", move |method: &mut Method| {
            let mut info = StringMap::new();
            info.insert("channel".into(), channel_name.clone());
            info.insert("version".into(), env!("CARGO_PKG_VERSION").into());
            info.insert("protocol_version".into(), PROTOCOL_VERSION.to_string());
            info.insert("methods".into(), BUILTIN_METHODS.join(","));
            method.return_value(info)
        })
        .with_handler("echo", |method: &mut Method| {
            let value: Option<Value> = method.get_optional_argument("value")?;
            method.return_value(value.unwrap_or_default())
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(&dirs)?,
    };
    let _logging = init_logging(&config.logging, &dirs)?;

    match cli.command {
        Command::Serve(serve) => {
            if let Some(channel) = serve.channel {
                config.channel.name = channel;
            }
            config.validate()?;
            tracing::info!(
                channel = %config.channel.name,
                log_dir = %dirs.log_dir().display(),
                "starting channel server"
            );
            let server = ChannelServer::new(builtin_dispatcher(&config.channel.name), &config.channel);
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            server.serve(stdin.lock(), stdout.lock())?;
        }
        Command::Call(call) => {
            let invocation = call.invocation()?;
            tracing::debug!(method = %invocation.name(), id = call.id, "encoding request");
            let request = PluginRequest::new(call.id, &invocation);
            println!("{}", serde_json::to_string(&request)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanbridge_core::ChannelConfig;
    use chanbridge_plugin::{PluginResponse, PluginResult, ResponseSlot};
    use std::io::Cursor;

    fn call(method: &str) -> CallCommand {
        CallCommand {
            method: method.into(),
            id: 1,
            ints: vec![],
            floats: vec![],
            strings: vec![],
            bools: vec![],
        }
    }

    #[test]
    fn call_builds_typed_arguments() {
        let mut cmd = call("load");
        cmd.ints = vec!["id=3".into()];
        cmd.floats = vec!["volume=0.5".into()];
        cmd.strings = vec!["path=/music/a b.mp3".into()];
        cmd.bools = vec!["loop=true".into()];

        let invocation = cmd.invocation().expect("arguments should parse");
        let args = invocation.arguments();
        assert_eq!(args.get("id"), Some(&Value::Int(3)));
        assert_eq!(args.get("volume"), Some(&Value::Float(0.5)));
        assert_eq!(args.get("path"), Some(&Value::from("/music/a b.mp3")));
        assert_eq!(args.get("loop"), Some(&Value::Bool(true)));
    }

    #[test]
    fn call_string_value_may_contain_equals() {
        let mut cmd = call("load");
        cmd.strings = vec!["query=a=b".into()];
        let invocation = cmd.invocation().unwrap();
        assert_eq!(invocation.arguments().get("query"), Some(&Value::from("a=b")));
    }

    #[test]
    fn call_rejects_bad_pairs() {
        let mut cmd = call("load");
        cmd.ints = vec!["id".into()];
        assert!(matches!(cmd.invocation(), Err(ArgumentError::MissingSeparator(_))));

        cmd.ints = vec!["=3".into()];
        assert!(matches!(cmd.invocation(), Err(ArgumentError::EmptyKey(_))));

        cmd.ints = vec!["id=three".into()];
        assert_eq!(
            cmd.invocation(),
            Err(ArgumentError::Parse {
                key: "id".into(),
                value: "three".into(),
                kind: ArgKind::Int,
            })
        );
    }

    #[test]
    fn every_kind_rejects_unparsable_text() {
        let cases = [
            (ArgKind::Int, "1.5"),
            (ArgKind::Float, "loud"),
            (ArgKind::Float, "NaN"),
            (ArgKind::Float, "inf"),
            (ArgKind::Bool, "yes"),
        ];
        for (kind, text) in cases {
            assert_eq!(kind.parse(text), None, "{kind} accepted {text:?}");
        }
        assert_eq!(ArgKind::String.parse(" 7 "), Some(Value::from(" 7 ")));
        assert_eq!(ArgKind::Float.parse(" -0.25 "), Some(Value::Float(-0.25)));

        let mut cmd = call("setVolume");
        cmd.floats = vec!["volume=NaN".into()];
        let err = cmd.invocation().unwrap_err();
        assert_eq!(err.to_string(), "argument `volume`: `NaN` is not a valid float");
    }

    #[test]
    fn call_rejects_duplicate_keys_across_kinds() {
        let mut cmd = call("seek");
        cmd.ints = vec!["position=1".into()];
        cmd.floats = vec!["position=1.5".into()];
        assert_eq!(
            cmd.invocation(),
            Err(ArgumentError::Duplicate {
                key: "position".into()
            })
        );
    }

    #[test]
    fn describe_reports_channel() {
        let dispatcher = builtin_dispatcher("flutter_audio_desktop");
        let slot = ResponseSlot::new();
        dispatcher
            .dispatch(Invocation::new("describe"), slot.responder())
            .unwrap();

        let info = slot
            .take()
            .and_then(|response| response.value().cloned())
            .expect("describe should succeed")
            .get::<StringMap>()
            .unwrap();
        assert_eq!(info["channel"], "flutter_audio_desktop");
        assert_eq!(info["methods"], "describe,echo");
    }

    #[test]
    fn echo_serves_over_lines() {
        let server = ChannelServer::new(builtin_dispatcher("test"), &ChannelConfig::default());
        let input = "{\"id\":1,\"method\":\"echo\",\"args\":{\"value\":2.5}}\n{\"id\":2,\"method\":\"echo\"}\n";
        let mut output = Vec::new();
        server.serve(Cursor::new(input), &mut output).unwrap();

        let responses: Vec<PluginResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses[0].result, PluginResult::Success { value: Value::Float(2.5) });
        assert_eq!(responses[1].result, PluginResult::Success { value: Value::Null });
    }
}
