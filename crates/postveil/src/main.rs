//! `postveil` - CLI for the postveil rule document
//!
//! This binary manages the persisted rule document the in-page engine
//! reads: blocked phrases, audit counters, and viewer settings.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use clap::Parser;

use postveil::cli::{AuditCommand, Cli, Command, ConfigCommand, RulesCommand, SettingsCommand};
use postveil::matcher::validate_rules;
use postveil::rules::BlockedRule;
use postveil::store::RuleStore;
use postveil::{init_logging, Config, JsonFileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;
    let store = JsonFileStore::open(config.document_path())?;

    // Execute the command
    match cli.command {
        Command::Rules(rules_cmd) => handle_rules(&store, rules_cmd).await,
        Command::Audit(audit_cmd) => handle_audit(&store, &audit_cmd).await,
        Command::Settings(settings_cmd) => handle_settings(&store, settings_cmd).await,
        Command::Config(config_cmd) => handle_config(&config, &config_cmd),
    }
}

async fn handle_rules(store: &JsonFileStore, cmd: RulesCommand) -> anyhow::Result<()> {
    match cmd {
        RulesCommand::List { json } => {
            let rules = store.all_rules().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else if rules.is_empty() {
                println!("No rules configured.");
            } else {
                for (idx, rule) in rules.iter().enumerate() {
                    println!("{}. {}", idx + 1, describe_rule(rule));
                }
            }
        }
        RulesCommand::Add(add) => {
            let rule = BlockedRule {
                phrase: add.phrase,
                use_regex: add.regex,
                use_overlay: add.overlay,
                filter_username: add.filter_username,
            };
            // Reject a bad regex before anything is persisted.
            validate_rules(std::slice::from_ref(&rule))?;

            let replaced = store.has_rule(&rule.phrase).await?;
            store.add_rule(rule.clone()).await?;
            if replaced {
                println!("Replaced rule: {}", describe_rule(&rule));
            } else {
                println!("Added rule: {}", describe_rule(&rule));
            }
        }
        RulesCommand::Remove { phrase } => {
            if store.remove_rule(&phrase).await? {
                println!("Removed rule '{phrase}'.");
            } else {
                println!("No rule with phrase '{phrase}'.");
            }
        }
    }
    Ok(())
}

async fn handle_audit(store: &JsonFileStore, cmd: &AuditCommand) -> anyhow::Result<()> {
    let counts = store.audit_counts().await?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else if counts.is_empty() {
        println!("No hides recorded yet.");
    } else {
        for (phrase, count) in &counts {
            println!("{count:>6}  {phrase}");
        }
    }
    Ok(())
}

async fn handle_settings(store: &JsonFileStore, cmd: SettingsCommand) -> anyhow::Result<()> {
    match cmd {
        SettingsCommand::Username(username_cmd) => {
            let mut settings = store.global_settings().await?;
            if username_cmd.clear {
                settings.username = None;
                store.set_global_settings(settings).await?;
                println!("Cleared viewer handle.");
            } else if let Some(handle) = username_cmd.handle {
                settings.username = Some(handle.clone());
                store.set_global_settings(settings).await?;
                println!("Viewer handle set to '{handle}'.");
            } else {
                match settings.username {
                    Some(handle) => println!("Viewer handle: {handle}"),
                    None => println!("No viewer handle set."),
                }
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Rule document: {}", config.document_path().display());
                println!("Settings page: {}", config.routes.settings_path);
                println!("Timeline routes:");
                for route in &config.routes.timelines {
                    println!(
                        "  {} -> [aria-label*='{}']{}",
                        route.paths.join(", "),
                        route.container_label,
                        if route.deep { " (deep)" } else { "" }
                    );
                }
            }
        }
        ConfigCommand::Path => {
            println!("Config file:   {}", Config::default_config_path().display());
            println!("Rule document: {}", config.document_path().display());
        }
    }
    Ok(())
}

fn describe_rule(rule: &BlockedRule) -> String {
    let mut flags = Vec::new();
    if rule.use_regex {
        flags.push("regex");
    }
    if rule.use_overlay {
        flags.push("overlay");
    }
    if rule.filter_username {
        flags.push("username");
    }
    if flags.is_empty() {
        format!("'{}'", rule.phrase)
    } else {
        format!("'{}' ({})", rule.phrase, flags.join(", "))
    }
}
