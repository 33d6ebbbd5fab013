//! Human-readable terminal output.

use ciprov_core::{ReconciliationReport, ReportEntry, ResourceKind, ResourceOutcome};
use ciprov_reconciler::ReconcileEvent;
use console::style;

const RULE_WIDTH: usize = 50;

pub fn print_success(msg: &str) {
    println!("{}", style(format!("✓ {}", msg)).green());
}

pub fn print_error(msg: &str) {
    println!("{}", style(format!("✗ {}", msg)).red());
}

pub fn print_warn(msg: &str) {
    println!("{}", style(format!("⚠ {}", msg)).yellow());
}

pub fn print_info(msg: &str) {
    println!("{}", style(format!("ℹ {}", msg)).blue());
}

pub fn print_rule() {
    println!("{}", "=".repeat(RULE_WIDTH));
}

pub fn print_header(title: &str, fields: &[(&str, &str)]) {
    println!("{}", style(title).green().bold());
    print_rule();
    for (label, value) in fields {
        println!("{}: {}", label, value);
    }
    println!();
}

pub fn print_list(title: &str, items: &[String]) {
    println!();
    println!("{}", title);
    for (i, item) in items.iter().enumerate() {
        println!("{}. {}", i + 1, item);
    }
}

pub fn print_event(event: &ReconcileEvent) {
    match event {
        ReconcileEvent::Probing => print_info("Testing connection to Jenkins..."),
        ReconcileEvent::Connected => {
            print_success("Connected successfully");
            println!();
        }
        ReconcileEvent::ConnectionFailed { failure } => {
            print_error(&failure.to_string());
            print_connection_help();
        }
        ReconcileEvent::PluginListing { installed } => match installed {
            Some(count) => {
                println!("Found {} installed plugins", count);
                println!();
            }
            None => {
                print_warn("Could not read the installed plugin list");
                println!();
            }
        },
        ReconcileEvent::ResourceStarted { resource } => {
            let verb = match resource.kind {
                ResourceKind::Plugin => "Installing plugin",
                ResourceKind::Credential => "Adding credential",
                ResourceKind::Job => "Creating pipeline job",
            };
            println!("{}: {}...", verb, resource.name);
        }
        ReconcileEvent::ResourceCompleted { entry } => print_entry(entry),
        ReconcileEvent::Completed { .. } => {}
    }
}

fn print_entry(entry: &ReportEntry) {
    let name = &entry.resource.name;
    match (&entry.outcome, entry.resource.kind) {
        (ResourceOutcome::AlreadyPresent, ResourceKind::Plugin) => {
            print_success(&format!("Plugin '{}' is already installed", name))
        }
        (ResourceOutcome::AlreadyPresent, ResourceKind::Credential) => {
            print_success(&format!("Credential '{}' already exists", name))
        }
        (ResourceOutcome::AlreadyPresent, ResourceKind::Job) => {
            print_warn(&format!("Job '{}' already exists", name))
        }
        (ResourceOutcome::Created, ResourceKind::Plugin) => {
            print_success(&format!("Plugin '{}' installation initiated", name))
        }
        (ResourceOutcome::Created, ResourceKind::Credential) => {
            print_success(&format!("Credential '{}' added successfully", name))
        }
        (ResourceOutcome::Created, ResourceKind::Job) => {
            print_success(&format!("Pipeline job '{}' created successfully", name))
        }
        (ResourceOutcome::Failed { reason }, kind) => {
            let action = match kind {
                ResourceKind::Plugin => "install plugin",
                ResourceKind::Credential => "add credential",
                ResourceKind::Job => "create job",
            };
            print_error(&format!("Failed to {} '{}': {}", action, name, reason));
        }
    }

    if let Some(note) = &entry.note {
        print_info(&format!("You may need to {}", note));
    }
    println!();
}

pub fn print_summary(report: &ReconciliationReport) {
    print_rule();
    if report.aborted.is_some() {
        print_error("Nothing was changed: the orchestrator could not be reached");
        return;
    }

    if report.success() {
        print_success("All resources reconciled!");
        return;
    }

    print_error("Some resources failed:");
    for entry in report.failures() {
        if let ResourceOutcome::Failed { reason } = &entry.outcome {
            println!("  - {}: {}", entry.resource, reason);
        }
    }
}

fn print_connection_help() {
    print_list(
        "Please check:",
        &[
            "Jenkins URL is correct".to_string(),
            "Username and API token are correct".to_string(),
            "Jenkins is running and accessible".to_string(),
        ],
    );
    print_list(
        "To get your API token:",
        &[
            "Go to Jenkins → Click your username (top right)".to_string(),
            "Click 'Configure'".to_string(),
            "Under 'API Token', click 'Add new token'".to_string(),
            "Copy the token and pass it with --token".to_string(),
        ],
    );
    println!();
}
