//! Credential and pipeline job setup command.

use anyhow::{Result, bail};
use ciprov_core::{ChoiceParameter, Credential, DesiredState, Job, Secret};
use ciprov_reconciler::ReconcileSettings;
use clap::Args;

use super::{ConnectionArgs, prompt_secret, prompt_text};
use crate::output;

#[derive(Args, Clone, Debug)]
pub struct SetupArgs {
    /// Id of the secret-text credential to store
    #[arg(long, default_value = "databricks-pat")]
    pub credential_id: String,

    /// Secret to store (prompted for if omitted)
    #[arg(long, env = "CIPROV_CREDENTIAL_SECRET", hide_env_values = true)]
    pub credential_secret: Option<String>,

    /// Description shown next to the credential
    #[arg(long, default_value = "Databricks PAT for bundle operations")]
    pub credential_description: String,

    /// Git repository holding the pipeline definition (prompted for if omitted)
    #[arg(long)]
    pub git_url: Option<String>,

    /// Name of the pipeline job
    #[arg(long, default_value = "databricks-elt-pipeline")]
    pub job_name: String,

    /// Branch specifier to build
    #[arg(long, default_value = "*/main")]
    pub branch: String,

    /// Path of the pipeline file within the repository
    #[arg(long, default_value = "Databricks_etl1/jenkinsfile")]
    pub script_path: String,

    /// Choices for the TARGET build parameter
    #[arg(long, value_delimiter = ',', default_value = "dev,prod")]
    pub target_choices: Vec<String>,

    /// Skip adding the credential
    #[arg(long)]
    pub skip_credentials: bool,

    /// Skip creating the job
    #[arg(long)]
    pub skip_job: bool,
}

pub async fn run(connection: &ConnectionArgs, args: SetupArgs) -> Result<bool> {
    let endpoint = connection.resolve(None)?;

    let credential = if args.skip_credentials {
        None
    } else {
        let secret = match &args.credential_secret {
            Some(secret) => Secret::new(secret.clone()),
            None => prompt_secret(&format!("Secret for credential '{}':", args.credential_id))?,
        };
        if secret.is_empty() {
            bail!("No secret provided for credential '{}'", args.credential_id);
        }
        Some(Credential {
            id: args.credential_id.clone(),
            secret,
            description: args.credential_description.clone(),
        })
    };

    let job = if args.skip_job {
        None
    } else {
        let git_url = match &args.git_url {
            Some(url) => url.clone(),
            None => prompt_text("Git repository URL:")?,
        };
        let mut job = Job::new(args.job_name.clone(), git_url);
        job.branch = args.branch.clone();
        job.script_path = args.script_path.clone();
        job.parameter = target_parameter(&args.target_choices);
        Some(job)
    };

    let username = match endpoint.auth() {
        ciprov_core::Auth::Basic { username, .. } => username.clone(),
        ciprov_core::Auth::Bearer(_) => String::new(),
    };
    let git_url = job
        .as_ref()
        .map(|j| j.repository_url.clone())
        .unwrap_or_default();
    output::print_header(
        "Jenkins Complete Setup",
        &[
            ("Jenkins URL", endpoint.base_url()),
            ("Username", &username),
            ("Job Name", &args.job_name),
            ("Git URL", &git_url),
        ],
    );

    if args.skip_credentials {
        output::print_info("Skipping credentials");
    }
    if args.skip_job {
        output::print_info("Skipping job creation");
    } else {
        output::print_info("The job builds from Git; make sure your code is pushed to:");
        println!("  {}", git_url);
        println!();
    }

    let base_url = endpoint.base_url().to_string();
    let desired = DesiredState {
        plugins: Vec::new(),
        credential,
        job,
    };
    let report = super::reconcile(endpoint, desired, ReconcileSettings::default()).await?;

    if report.success() && !args.skip_job {
        let mut steps = vec![format!("Open the job: {}/job/{}", base_url, args.job_name)];
        let choices = target_choices(&args.target_choices);
        if choices.is_empty() {
            steps.push("Click 'Build Now'".to_string());
        } else {
            steps.push("Click 'Build with Parameters'".to_string());
            steps.push(format!("Select TARGET ({})", choices.join(" or ")));
            steps.push("Click 'Build'".to_string());
        }
        output::print_list("Next steps:", &steps);
    }

    Ok(report.success())
}

fn target_choices(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// The TARGET choice parameter, or `None` when no non-blank choice was given.
fn target_parameter(raw: &[String]) -> Option<ChoiceParameter> {
    let choices = target_choices(raw);
    if choices.is_empty() {
        return None;
    }
    Some(ChoiceParameter {
        name: "TARGET".to_string(),
        description: "Databricks bundle target environment".to_string(),
        choices,
    })
}
