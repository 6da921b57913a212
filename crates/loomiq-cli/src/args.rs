use clap::{Args, Parser, Subcommand, ValueEnum};
use loomiq_stream::TaskPriority;

#[derive(Debug, Parser)]
#[command(name = "loomiq", version, about = "Submit LoomIQ tasks and follow their live progress")]
pub struct Cli {
    /// API root, e.g. http://localhost:3000/api
    #[arg(long, global = true, env = "LOOMIQ_API_BASE")]
    pub api_base: Option<String>,

    /// Print log lines as JSON, one object per line.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log more to stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and print the access token.
    Login {
        #[arg(long, short)]
        username: String,
        #[arg(long, env = "LOOMIQ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Submit a task and stream its progress.
    Run(RunArgs),
    /// Stream the progress of an existing task.
    Watch {
        task_id: String,
        #[command(flatten)]
        auth: TokenArgs,
    },
    /// List tasks, newest first.
    Tasks {
        /// Refresh every SECS seconds (3 when given without a value) until Ctrl-C.
        #[arg(long, value_name = "SECS", num_args = 0..=1, default_missing_value = "3")]
        poll: Option<u64>,
        #[command(flatten)]
        auth: TokenArgs,
    },
    /// List the agents the backend can assign.
    Agents {
        #[command(flatten)]
        auth: TokenArgs,
    },
    /// Show task counters.
    Stats {
        #[command(flatten)]
        auth: TokenArgs,
    },
    /// Log in and show the profile, roles and permissions.
    Whoami {
        #[arg(long, short)]
        username: String,
        #[arg(long, env = "LOOMIQ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Change the account password.
    Passwd {
        #[arg(long, env = "LOOMIQ_PASSWORD", hide_env_values = true)]
        old: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
        #[command(flatten)]
        auth: TokenArgs,
    },
}

impl Cli {
    /// Level for the loomiq log targets.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Bearer token from `loomiq login`.
    #[arg(long, env = "LOOMIQ_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// What the agents should do.
    #[arg(long, short)]
    pub prompt: String,
    #[arg(long = "type", default_value = "implementation")]
    pub task_type: String,
    #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
    pub priority: PriorityArg,
    /// Let several agents collaborate on the task.
    #[arg(long)]
    pub collaborate: bool,
    #[command(flatten)]
    pub auth: TokenArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for TaskPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => TaskPriority::Low,
            PriorityArg::Medium => TaskPriority::Medium,
            PriorityArg::High => TaskPriority::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_flags() {
        let cli = Cli::try_parse_from([
            "loomiq",
            "run",
            "--prompt",
            "Build it",
            "--priority",
            "high",
            "--collaborate",
            "--token",
            "tok",
        ])
        .expect("parse");
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.prompt, "Build it");
        assert_eq!(run.task_type, "implementation");
        assert_eq!(run.priority, PriorityArg::High);
        assert!(run.collaborate);
        assert_eq!(run.auth.token, "tok");
    }

    #[test]
    fn watch_takes_task_id_and_global_json() {
        let cli = Cli::try_parse_from(["loomiq", "watch", "abc123", "--token", "t", "--json"])
            .expect("parse");
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Watch { ref task_id, .. } if task_id == "abc123"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory as _;
        Cli::command().debug_assert();
    }

    #[test]
    fn tasks_poll_defaults_to_three_seconds_when_bare() {
        let cli = Cli::try_parse_from(["loomiq", "tasks", "--poll", "--token", "t"]).expect("parse");
        assert!(matches!(cli.command, Command::Tasks { poll: Some(3), .. }));
        let cli = Cli::try_parse_from(["loomiq", "tasks", "--poll=10", "--token", "t"]).expect("parse");
        assert!(matches!(cli.command, Command::Tasks { poll: Some(10), .. }));
        let cli = Cli::try_parse_from(["loomiq", "tasks", "--token", "t"]).expect("parse");
        assert!(matches!(cli.command, Command::Tasks { poll: None, .. }));
    }

    #[test]
    fn passwd_takes_old_new_and_confirmation() {
        let cli = Cli::try_parse_from([
            "loomiq", "passwd", "--old", "a", "--new", "bbbbbbbb", "--confirm", "bbbbbbbb",
            "--token", "t",
        ])
        .expect("parse");
        let Command::Passwd { old, new, confirm, .. } = cli.command else {
            panic!("expected passwd");
        };
        assert_eq!((old.as_str(), new.as_str(), confirm.as_str()), ("a", "bbbbbbbb", "bbbbbbbb"));
    }

    #[test]
    fn verbosity_raises_log_level() {
        let cli = Cli::try_parse_from(["loomiq", "-vv", "agents", "--token", "t"]).expect("parse");
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::try_parse_from(["loomiq", "stats", "--token", "t"]).expect("parse");
        assert_eq!(cli.log_level(), "warn");
    }
}
