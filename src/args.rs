use clap::{Parser, Subcommand};

/// Spread a fixed budget of votes across the candidates of a round.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON description of the round: budget, candidates and storage.
    /// Without it, the round has 100 votes and the candidates c1 to c5.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The shared store of profiles and submitted votes. Setting this option
    /// overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    /// (file path) Where the current session is kept between invocations. Setting this option
    /// overrides the path that may be specified with the --config option.
    #[clap(long, value_parser)]
    pub cache: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Suggests a random profile name.
    Name,
    /// Plays a short round with a few random profiles, without touching any file.
    Demo {
        /// (default 3) The number of profiles taking part.
        #[clap(long, value_parser)]
        voters: Option<usize>,
    },
    #[clap(flatten)]
    Session(SessionCommand),
}

/// The commands working on the store and the saved session.
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Creates a profile. Without a name, a random one is picked.
    Register {
        #[clap(value_parser)]
        name: Option<String>,
        /// (4 digits) Needed to log in again later.
        #[clap(short, long, value_parser)]
        pin: Option<String>,
    },
    /// Logs into an existing profile and picks up its submitted votes.
    Login {
        #[clap(value_parser)]
        name: String,
        #[clap(short, long, value_parser)]
        pin: String,
    },
    /// Forgets the current session. Submitted votes are kept.
    Logout,
    /// Shows the current allocation.
    Status,
    /// Adds one vote to a candidate.
    Incr {
        #[clap(value_parser)]
        candidate: String,
    },
    /// Removes one vote from a candidate.
    Decr {
        #[clap(value_parser)]
        candidate: String,
    },
    /// Sets the votes of a candidate. The value is reduced to what the budget allows.
    Set {
        #[clap(value_parser)]
        candidate: String,
        #[clap(value_parser, allow_hyphen_values = true)]
        count: i64,
    },
    /// Puts every candidate back to zero.
    Reset,
    /// Sends the allocation to the store, replacing the previous submission.
    Submit,
    /// Replaces the local allocation with the submitted one.
    Refresh,
    /// Shows the totals of all the submitted votes.
    Leaderboard {
        /// Keeps running and prints the leaderboard again after every change.
        #[clap(long, takes_value = false)]
        watch: bool,
        /// (seconds, default 2) How often the store is read again while watching.
        #[clap(long, value_parser)]
        interval: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Command {
        let mut argv = vec!["votebudget"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn commands() {
        assert!(matches!(command(&["name"]), Command::Name));
        assert!(matches!(
            command(&["demo", "--voters", "5"]),
            Command::Demo { voters: Some(5) }
        ));
        assert!(matches!(
            command(&["set", "c1", "-3"]),
            Command::Session(SessionCommand::Set { count: -3, .. })
        ));
        assert!(matches!(
            command(&["leaderboard", "--watch"]),
            Command::Session(SessionCommand::Leaderboard {
                watch: true,
                interval: None
            })
        ));
        assert!(Args::try_parse_from(["votebudget", "vote"]).is_err());
    }
}
