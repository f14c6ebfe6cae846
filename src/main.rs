use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use beam_realtime::api::HistoryQuery;
use beam_realtime::config::Config;
use beam_realtime::conversation::{ConversationFeed, MessageHistory, TypingTracker};
use beam_realtime::error::ErrorReport;
use beam_realtime::model::Message;
use beam_realtime::realtime::{ConnectionState, LocalBroker, RealtimeClient, RemoteProvider};
use beam_realtime::workload::{projected_utilization, AssignmentBoard, CapacityVerdict};
use beam_realtime::{logging, server, MessageBackend, PortalClient, WorkloadBackend};

#[derive(Parser)]
#[command(name = "beam")]
#[command(about = "Realtime conversations and capacity-aware task assignment for the Pink Beam portal", version)]
#[command(after_help = "Configuration is read from beam.toml (or BEAM_CONFIG), then
BEAM_API_URL, BEAM_API_TOKEN, BEAM_REALTIME_URL and BEAM_LOG override it.")]
struct Cli {
    /// Config file, instead of BEAM_CONFIG or ./beam.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the development relay (WebSocket provider + HTTP ingest)
    Serve {
        #[arg(short, long, default_value = "4000")]
        port: u16,
    },

    /// Follow a conversation live: new messages and who is typing
    Watch {
        #[arg(short, long)]
        conversation: String,

        /// Your user id; your own typing signals are not shown
        #[arg(long, default_value = "beam-cli")]
        user_id: String,

        #[arg(long, default_value = "Beam CLI")]
        user_name: String,
    },

    /// Send a message to a conversation
    Send {
        #[arg(short, long)]
        conversation: String,

        text: String,
    },

    /// Print message history, newest page first
    History {
        #[arg(short, long)]
        conversation: String,

        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only messages older than this message id
        #[arg(short, long)]
        before: Option<String>,

        /// Number of pages to walk back
        #[arg(long, default_value = "1", conflicts_with = "before")]
        pages: usize,
    },

    /// Show team capacity and utilization
    Roster,

    /// Assign a task to a team member, then show the refreshed roster
    Assign {
        #[arg(short, long)]
        task: String,

        #[arg(short, long)]
        member: String,

        /// Restrict the task lookup to one project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Run the capacity guard offline
    Check {
        /// Capacity in hours
        #[arg(long)]
        capacity: f64,

        /// Current utilization in percent
        #[arg(long, conflicts_with = "allocated")]
        utilization: Option<f64>,

        /// Allocated hours, instead of --utilization
        #[arg(long)]
        allocated: Option<f64>,

        /// Task estimate in hours
        #[arg(short, long, default_value = "0")]
        estimate: f64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => fail(err),
    };
    let guard = match logging::init(&config.log) {
        Ok(guard) => guard,
        Err(err) => fail(err),
    };

    let result = run(cli.command, config).await;
    drop(guard);
    if let Err(err) = result {
        fail(err);
    }
}

fn fail(err: anyhow::Error) -> ! {
    eprint!("{}", ErrorReport::new(err).display().red());
    std::process::exit(1);
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Serve { port } => {
            println!(
                "{}",
                format!("🌐 Starting relay on port {}...", port).cyan().bold()
            );
            server::start(port, LocalBroker::new()).await?;
        }

        Commands::Watch {
            conversation,
            user_id,
            user_name,
        } => watch(&config, &conversation, user_id, user_name).await?,

        Commands::Send { conversation, text } => {
            let portal = PortalClient::from_config(&config.api)?;
            match portal.send_message(&conversation, &text, None).await? {
                Some(message) => println!(
                    "{} Sent {}",
                    "✓".green(),
                    message.id.bright_yellow()
                ),
                None => println!("{} Sent", "✓".green()),
            }
        }

        Commands::History {
            conversation,
            limit,
            before,
            pages,
        } => {
            let portal = PortalClient::from_config(&config.api)?;
            let page_size = limit.unwrap_or(config.realtime.history_page_size);

            let messages = match before {
                Some(before) => {
                    let query = HistoryQuery {
                        limit: page_size,
                        before: Some(before),
                    };
                    portal.fetch_messages(&conversation, &query).await?
                }
                None => {
                    let history = MessageHistory::new(portal, page_size);
                    history.set_conversation(Some(&conversation)).await?;
                    for _ in 1..pages {
                        if !history.has_more() {
                            break;
                        }
                        history.load_more().await?;
                    }
                    if !history.has_more() {
                        println!("{}", "(start of conversation)".dimmed());
                    }
                    history.messages()
                }
            };

            for message in &messages {
                print_message(message);
            }
            println!("{} {} messages", "✓".green(), messages.len());
        }

        Commands::Roster => {
            let board = AssignmentBoard::new(PortalClient::from_config(&config.api)?, config.capacity);
            board.refresh_roster().await?;
            print_roster(&board);
        }

        Commands::Assign {
            task,
            member,
            project,
        } => {
            let board = AssignmentBoard::new(PortalClient::from_config(&config.api)?, config.capacity);
            board.refresh_roster().await?;
            board.load_tasks(project.as_deref()).await?;

            let result = board.assign(&task, &member).await?;
            match result.assessment {
                Some(assessment) => {
                    println!(
                        "  {} → {:.0}% ({})",
                        format!("{:.0}%", assessment.current).bright_white(),
                        assessment.projected,
                        verdict_label(assessment.verdict)
                    );
                    if assessment.needs_notice() {
                        println!("  {}", "Member will be over capacity".yellow());
                    }
                }
                None => println!("  {}", "Task or member not in snapshot, guard skipped".dimmed()),
            }
            println!(
                "{} Assigned {} to {}",
                "✓".green(),
                result.task_id.bright_yellow(),
                result.assignee_id.bright_white()
            );
            if result.roster_refreshed {
                print_roster(&board);
            } else {
                println!("{}", "⚠ Roster refresh failed; figures above may be stale".yellow());
            }
        }

        Commands::Check {
            capacity,
            utilization,
            allocated,
            estimate,
        } => {
            if capacity < 0.0 || estimate < 0.0 {
                bail!("invalid input: capacity and estimate must not be negative");
            }
            let current = match (utilization, allocated) {
                (Some(utilization), _) => utilization,
                (None, Some(allocated)) if capacity > 0.0 => allocated * 100.0 / capacity,
                (None, Some(allocated)) if allocated > 0.0 => f64::INFINITY,
                _ => 0.0,
            };
            let projected = projected_utilization(current, capacity, estimate);
            let verdict = config.capacity.classify(projected);
            println!(
                "{:.1}% + {}h of {}h → {:.1}% {}",
                current,
                estimate,
                capacity,
                projected,
                verdict_label(verdict)
            );
        }
    }

    Ok(())
}

async fn watch(config: &Config, conversation: &str, user_id: String, user_name: String) -> Result<()> {
    let provider = RemoteProvider::spawn(&config.realtime.url, config.realtime.reconnect.clone())
        .context("invalid realtime url")?;
    println!(
        "{}",
        format!("👁  Connecting to {}...", config.realtime.url).cyan().bold()
    );
    if !provider.wait_connected(Duration::from_secs(5)).await {
        println!("{}", "⚠ Relay not reachable yet, retrying in the background".yellow());
    }

    let provider = Arc::new(provider);
    let client = RealtimeClient::new(provider.clone());

    let mut feed = ConversationFeed::new(client.clone()).on_new_message(print_message);
    feed.attach(Some(conversation), true);

    let mut typing = TypingTracker::new(client.clone(), user_id, user_name, config.realtime.typing_options());
    typing.attach(Some(conversation), true);

    println!(
        "{} Watching {} (Ctrl+C to stop)",
        "✓".green(),
        conversation.bright_yellow()
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut shown = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if provider.state() == ConnectionState::GaveUp {
                    bail!("connection to relay at {} lost", config.realtime.url);
                }
                let names: Vec<String> = typing.typing_users().into_iter().map(|u| u.user_name).collect();
                let line = names.join(", ");
                if line != shown {
                    if !line.is_empty() {
                        println!("  {} {}", line.dimmed(), "is typing...".dimmed());
                    }
                    shown = line;
                }
            }
        }
    }

    typing.detach();
    feed.detach();
    client.unsubscribe_all_channels();
    Ok(())
}

fn print_message(message: &Message) {
    let sender = message.sender_id.as_deref().unwrap_or("-");
    println!(
        "{} {} {}: {}",
        message.created_at.format("%H:%M:%S").to_string().dimmed(),
        format!("[{}]", message.sender_type).bright_blue(),
        sender.bright_white(),
        message.content
    );
}

fn print_roster<B: WorkloadBackend>(board: &AssignmentBoard<B>) {
    let policy = board.policy();
    for member in board.roster() {
        let utilization = member.utilization();
        let figure = format!("{:>6.1}%", utilization);
        let figure = match policy.classify(utilization) {
            CapacityVerdict::Accept => figure.green(),
            CapacityVerdict::Warn => figure.yellow(),
            CapacityVerdict::Discourage => figure.red(),
        };
        println!(
            "  {:<24} {} {:>5.1}h / {:.1}h",
            member.name, figure, member.allocated, member.capacity
        );
    }
}

fn verdict_label(verdict: CapacityVerdict) -> ColoredString {
    match verdict {
        CapacityVerdict::Accept => "ok".green(),
        CapacityVerdict::Warn => "over capacity".yellow(),
        CapacityVerdict::Discourage => "not recommended".red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_pages_conflicts_with_before() {
        let parsed = Cli::try_parse_from(["beam", "history", "-c", "c1", "--before", "m9", "--pages", "3"]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["beam", "history", "-c", "c1", "--before", "m9"]).unwrap();
        assert!(matches!(cli.command, Commands::History { pages: 1, .. }));

        let cli = Cli::try_parse_from(["beam", "history", "-c", "c1", "--pages", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::History { pages: 3, before: None, .. }));
    }
}
