//! Interactive command console.
//!
//! A line-based prompt over stdin. Every command maps onto one supervisor or
//! store operation; invalid input prints a single diagnostic line and
//! returns to the prompt. Nothing here can take the process down.

pub mod tables;
mod validate;

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capture::CaptureRequest;
use crate::config::Settings;
use crate::database::repositories::TargetRepository;
use crate::monitor::RateGate;
use crate::resolver::UrlResolver;
use validate::{CliError, parse_sort, parse_target, site_name, validate_name};

pub struct Console {
    targets: Arc<dyn TargetRepository>,
    gate: RateGate,
    resolver: Arc<UrlResolver>,
    capture_tx: mpsc::Sender<CaptureRequest>,
    settings: Settings,
    prompt_slug: Option<String>,
}

impl Console {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        gate: RateGate,
        resolver: Arc<UrlResolver>,
        capture_tx: mpsc::Sender<CaptureRequest>,
        settings: Settings,
    ) -> Self {
        Self {
            targets,
            gate,
            resolver,
            capture_tx,
            settings,
            prompt_slug: None,
        }
    }

    /// Read commands until EOF, `quit`, or cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        println!("{}", "Type help or ? for command information.".cyan());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.print_prompt();

            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                // EOF or a broken stdin both end the console.
                _ => return,
            };

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = tokens.split_first() else {
                continue;
            };

            match command {
                "get" => self.cmd_get(args).await,
                "stop" => self.cmd_stop(args).await,
                "block" => self.cmd_block(args).await,
                "unfollow" => self.cmd_unfollow(args).await,
                "cap" => self.cmd_cap(args).await,
                "offline" => self.cmd_offline(args).await,
                "prompt" => self.cmd_prompt(args),
                "help" | "?" => print_help(),
                "quit" | "exit" | "end" => {
                    cancel.cancel();
                    return;
                }
                unknown => println!("Unknown command: {}", unknown.red()),
            }
        }
    }

    fn print_prompt(&self) {
        let prompt = self.prompt_slug.as_deref().unwrap_or("$");
        print!("{}", format!("{prompt}-> ").green());
        let _ = std::io::stdout().flush();
    }

    /// Resolve one target and hand it to the capture supervisor.
    async fn cmd_get(&self, args: &[&str]) {
        let target = match parse_target(args, self.prompt_slug.as_deref()) {
            Ok(target) => target,
            Err(e) => return fail(&e),
        };

        let resolution = match self.resolver.resolve_one(&target.name).await {
            Ok(resolution) => resolution,
            // NotFound, rate limit, and transport failures all end here
            // with one line; the supervisor never sees them.
            Err(e) => return fail(&e),
        };

        self.gate
            .pause_if_recent(self.settings.console_cooldown, "console get")
            .await;

        if self
            .capture_tx
            .send(CaptureRequest::Resolved(resolution))
            .await
            .is_err()
        {
            println!("{}", "Capture supervisor is not running".red());
        }
    }

    /// Terminate a running capture and stop following the target.
    async fn cmd_stop(&self, args: &[&str]) {
        let Some(&name) = args.first() else {
            return fail(&CliError::MissingInput);
        };
        if let Err(e) = validate_name(name) {
            return fail(&e);
        }

        let pid = match self.targets.pid_for(name).await {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                println!("No active capture for {}", name.yellow());
                return;
            }
            Err(e) => return fail(&e),
        };

        match u32::try_from(pid) {
            Ok(pid) if process_utils::terminate(pid) => {
                info!("Sent stop signal to recorder {pid}");
            }
            _ => println!("Recorder process {pid} was already gone"),
        }

        if let Err(e) = self.targets.stop_capturing(name).await {
            fail(&e);
        }
    }

    async fn cmd_block(&self, args: &[&str]) {
        let Some((&name, reason)) = args.split_first() else {
            return fail(&CliError::MissingInput);
        };
        if let Err(e) = validate_name(name) {
            return fail(&e);
        }

        if let Err(e) = self.targets.block(name, &reason.join(" ")).await {
            fail(&e);
        }
    }

    async fn cmd_unfollow(&self, args: &[&str]) {
        let Some(&name) = args.first() else {
            return fail(&CliError::MissingInput);
        };
        if let Err(e) = validate_name(name) {
            return fail(&e);
        }

        if let Err(e) = self.targets.unfollow(name).await {
            fail(&e);
        }
    }

    async fn cmd_cap(&self, args: &[&str]) {
        let sort = match parse_sort(args) {
            Ok(sort) => sort,
            Err(e) => return fail(&e),
        };
        match self.targets.capturing_listing(sort).await {
            Ok(rows) if rows.is_empty() => println!("Presently capturing zero streamers"),
            Ok(rows) => tables::print_listing(&["Streamers", "Capturing", "# Caps"], &rows),
            Err(e) => fail(&e),
        }
    }

    async fn cmd_offline(&self, args: &[&str]) {
        let sort = match parse_sort(args) {
            Ok(sort) => sort,
            Err(e) => return fail(&e),
        };
        match self.targets.offline_listing(sort).await {
            Ok(rows) if rows.is_empty() => println!("Following zero streamers"),
            Ok(rows) => tables::print_listing(&["Streamers", "Recent Stream", "# Caps"], &rows),
            Err(e) => fail(&e),
        }
    }

    fn cmd_prompt(&mut self, args: &[&str]) {
        let Some(&slug) = args.first() else {
            return;
        };
        if site_name(slug).is_none() {
            return fail(&CliError::UnknownSite(slug.to_string()));
        }
        self.prompt_slug = Some(slug.to_string());
    }
}

/// One diagnostic line, back to the prompt.
fn fail(error: &dyn std::fmt::Display) {
    println!("{}: {error}", "[FAIL]".red());
}

fn print_help() {
    println!("Commands:");
    println!("  get <name> [site]      resolve a streamer and start capturing");
    println!("  stop <name>            stop the running capture and unfollow");
    println!("  block <name> [reason]  permanently exclude a streamer");
    println!("  unfollow <name>        stop following a streamer");
    println!("  cap <name|date|num>    list streamers capturing right now");
    println!("  offline <name|date|num> list followed streamers not capturing");
    println!("  prompt <site>          set the default site (cb, mfc, sc)");
    println!("  quit                   leave (recordings keep running)");
}
