//! Command table

use anyhow::{bail, Context, Result};
use directgate_common::GatewayConfig;
use directgate_core::{DomainPostmasters, MessageRouter};
use directgate_policy::identifiers;
use directgate_policy::{CertificateAttributes, OperatorTable, PolicyFilter, PolicySet};
use std::path::Path;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub run: fn(&[String]) -> Result<()>,
}

pub static COMMANDS: &[Command] = &[
    Command {
        name: "oid",
        usage: "oid <name|oid>            Look up a certificate identifier",
        run: oid,
    },
    Command {
        name: "operators",
        usage: "operators                 List policy operators",
        run: operators,
    },
    Command {
        name: "policy-check",
        usage: "policy-check <policy.toml> <attributes.json>  Evaluate policies against certificate attributes",
        run: policy_check,
    },
    Command {
        name: "config-check",
        usage: "config-check <config.toml>  Validate a gateway configuration",
        run: config_check,
    },
    Command {
        name: "help",
        usage: "help                      Show this list",
        run: help,
    },
];

pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

pub fn print_help() {
    println!("Usage: directctl <command> [args]\n");
    for command in COMMANDS {
        println!("  {}", command.usage);
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing argument: {}", what))
}

fn help(_args: &[String]) -> Result<()> {
    print_help();
    Ok(())
}

fn oid(args: &[String]) -> Result<()> {
    let query = arg(args, 0, "name or oid")?;
    let matches = identifiers::lookup(query);
    if matches.is_empty() {
        bail!("no identifier matches '{}'", query);
    }
    for m in matches {
        println!("{:<22} {:<28} {}", m.table, m.name, m.oid);
    }
    Ok(())
}

fn operators(_args: &[String]) -> Result<()> {
    for op in OperatorTable::global().iter() {
        println!(
            "{:<16} {:<24} -> {}",
            op.to_string(),
            op.opcode().name(),
            op.result_type()
        );
    }
    Ok(())
}

/// Policy name and whether the certificate satisfies it
fn evaluate_policies(policy_file: &Path, attributes_file: &Path) -> Result<Vec<(String, bool)>> {
    let policies = PolicySet::from_file(policy_file)?
        .compile_all()
        .with_context(|| format!("compiling {}", policy_file.display()))?;

    let content = std::fs::read_to_string(attributes_file)
        .with_context(|| format!("reading {}", attributes_file.display()))?;
    let cert: CertificateAttributes = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", attributes_file.display()))?;

    Ok(policies
        .into_iter()
        .map(|policy| {
            let name = policy.name.clone();
            (name, PolicyFilter::new(policy).is_compliant(&cert))
        })
        .collect())
}

fn policy_check(args: &[String]) -> Result<()> {
    let policy_file = arg(args, 0, "policy file")?;
    let attributes_file = arg(args, 1, "attributes file")?;

    let results = evaluate_policies(Path::new(policy_file), Path::new(attributes_file))?;
    let failed = results.iter().filter(|(_, ok)| !ok).count();
    for (name, ok) in &results {
        println!("{:<32} {}", name, if *ok { "PASS" } else { "FAIL" });
    }

    if failed > 0 {
        bail!("{} of {} policies not satisfied", failed, results.len());
    }
    Ok(())
}

/// Summary lines for a valid configuration
fn check_config(path: &Path) -> Result<Vec<String>> {
    let config = GatewayConfig::from_file(path)?;
    config.validate()?;

    let postmasters = DomainPostmasters::init(&config.domains, &config.postmasters)?;
    let mut router = MessageRouter::new();
    router.set_routes(&config.incoming_routes)?;

    if let Some(policy_file) = &config.policies {
        PolicySet::from_file(policy_file)?
            .compile_all()
            .with_context(|| format!("compiling {}", policy_file.display()))?;
    }

    let mut summary: Vec<String> = postmasters
        .domains()
        .map(|domain| {
            let postmaster = postmasters
                .postmaster_for(domain)
                .map(ToString::to_string)
                .unwrap_or_default();
            format!("domain {} (postmaster {})", domain, postmaster)
        })
        .collect();
    for route in router.routes() {
        let folder = route
            .settings
            .copy_folder
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        summary.push(format!("route {} -> {}", route.pattern, folder));
    }
    Ok(summary)
}

fn config_check(args: &[String]) -> Result<()> {
    let path = arg(args, 0, "config file")?;
    for line in check_config(Path::new(path))? {
        println!("{}", line);
    }
    println!("OK");
    Ok(())
}
