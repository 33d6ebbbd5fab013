//! XML payload builders for the orchestrator API.
//!
//! Every value that originates from user input goes through quick-xml's text or attribute
//! escaping; nothing is spliced into markup by string formatting.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{Credential, Error, Job, Plugin, Result};

const CREDENTIAL_CLASS: &str = "com.cloudbees.plugins.credentials.impl.StringCredentialsImpl";
const CHOICE_PARAMETER_CLASS: &str = "hudson.model.ChoiceParameterDefinition";
const FLOW_DEFINITION_CLASS: &str = "org.jenkinsci.plugins.workflow.cps.CpsScmFlowDefinition";
const GIT_SCM_CLASS: &str = "hudson.plugins.git.GitSCM";

/// `<install plugin="NAME@latest"/>` for the plugin manager.
pub fn plugin_install(plugin: &Plugin) -> Result<String> {
    require_token("plugin name", &plugin.name)?;

    let mut doc = XmlDoc::new(false)?;
    let spec = format!("{}@latest", plugin.name);
    doc.empty("install", &[("plugin", spec.as_str())])?;
    doc.finish()
}

/// Global-scope secret-text credential descriptor.
pub fn credential_descriptor(credential: &Credential) -> Result<String> {
    require_token("credential id", &credential.id)?;
    if credential.secret.is_empty() {
        return Err(Error::InvalidInput(format!(
            "credential '{}' has an empty secret",
            credential.id
        )));
    }

    let mut doc = XmlDoc::new(true)?;
    doc.open(CREDENTIAL_CLASS, &[])?;
    doc.text_element("scope", "GLOBAL")?;
    doc.text_element("id", &credential.id)?;
    doc.text_element("description", &credential.description)?;
    doc.text_element("secret", credential.secret.expose())?;
    doc.close(CREDENTIAL_CLASS)?;
    doc.finish()
}

/// Pipeline job (`flow-definition`) reading its script from Git.
pub fn job_descriptor(job: &Job) -> Result<String> {
    require_token("job name", &job.name)?;
    require_non_empty("repository URL", &job.repository_url)?;
    require_non_empty("branch", &job.branch)?;
    require_non_empty("script path", &job.script_path)?;

    let mut doc = XmlDoc::new(true)?;
    doc.open("flow-definition", &[])?;
    doc.empty("actions", &[])?;
    doc.text_element("description", "")?;
    doc.text_element("keepDependencies", "false")?;

    match &job.parameter {
        Some(parameter) => {
            if parameter.choices.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "parameter '{}' of job '{}' has no choices",
                    parameter.name, job.name
                )));
            }
            require_non_empty("parameter name", &parameter.name)?;

            doc.open("properties", &[])?;
            doc.open("hudson.model.ParametersDefinitionProperty", &[])?;
            doc.open("parameterDefinitions", &[])?;
            doc.open(CHOICE_PARAMETER_CLASS, &[])?;
            doc.text_element("name", &parameter.name)?;
            doc.text_element("description", &parameter.description)?;
            doc.open("choices", &[("class", "java.util.Arrays$ArrayList")])?;
            doc.open("a", &[("class", "string-array")])?;
            for choice in &parameter.choices {
                doc.text_element("string", choice)?;
            }
            doc.close("a")?;
            doc.close("choices")?;
            doc.close(CHOICE_PARAMETER_CLASS)?;
            doc.close("parameterDefinitions")?;
            doc.close("hudson.model.ParametersDefinitionProperty")?;
            doc.close("properties")?;
        }
        None => doc.empty("properties", &[])?,
    }

    doc.open("definition", &[("class", FLOW_DEFINITION_CLASS)])?;
    doc.open("scm", &[("class", GIT_SCM_CLASS)])?;
    doc.text_element("configVersion", "2")?;
    doc.open("userRemoteConfigs", &[])?;
    doc.open("hudson.plugins.git.UserRemoteConfig", &[])?;
    doc.text_element("url", &job.repository_url)?;
    doc.close("hudson.plugins.git.UserRemoteConfig")?;
    doc.close("userRemoteConfigs")?;
    doc.open("branches", &[])?;
    doc.open("hudson.plugins.git.BranchSpec", &[])?;
    doc.text_element("name", &job.branch)?;
    doc.close("hudson.plugins.git.BranchSpec")?;
    doc.close("branches")?;
    doc.text_element("doGenerateSubmoduleConfigurations", "false")?;
    doc.empty("submoduleCfg", &[("class", "list")])?;
    doc.empty("extensions", &[])?;
    doc.close("scm")?;
    doc.text_element("scriptPath", &job.script_path)?;
    doc.text_element("lightweight", "true")?;
    doc.close("definition")?;

    doc.empty("triggers", &[])?;
    doc.text_element("disabled", "false")?;
    doc.close("flow-definition")?;
    doc.finish()
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Identifiers end up in URL paths and plugin specs, so they must be a single token.
fn require_token(field: &str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    if value.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(Error::InvalidInput(format!(
            "{} '{}' must not contain whitespace or '/'",
            field, value
        )));
    }
    Ok(())
}

struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    fn new(with_declaration: bool) -> Result<Self> {
        let mut doc = Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        };
        if with_declaration {
            doc.write(Event::Decl(BytesDecl::new("1.1", Some("UTF-8"), None)))?;
        }
        Ok(doc)
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write(Event::Empty(start))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.open(name, &[])?;
        // An empty text event keeps the closing tag on the same line under indentation.
        self.write(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Payload(e.to_string()))
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| Error::Payload(e.to_string()))
    }
}
