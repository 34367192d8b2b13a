//! Negotiate command - run a two-agent negotiation in-process

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::*;
use parley_attest::BriefingItem;
use parley_negotiation::{
    AgentId, AppContext, ConversationTurn, NegotiationCoordinator, Persona,
};
use serde_json::json;

use crate::display;

pub struct NegotiateOptions {
    pub name_a: String,
    pub name_b: String,
    pub briefing_a: Option<PathBuf>,
    pub briefing_b: Option<PathBuf>,
    pub rounds: usize,
    /// Session JSON (turns and trace) written here when set
    pub out: Option<PathBuf>,
}

pub async fn run(ctx: AppContext, options: NegotiateOptions) -> anyhow::Result<Vec<ConversationTurn>> {
    let coordinator = NegotiationCoordinator::new(ctx);

    display::section("Briefing Agents");
    let a = register(&coordinator, &options.name_a, options.briefing_a.as_deref()).await?;
    let b = register(&coordinator, &options.name_b, options.briefing_b.as_deref()).await?;

    let session_id = coordinator.create_session(&[a, b]).await?;
    let start = coordinator.start(session_id).await?;

    display::section("Negotiation");
    display::labeled("Session", &session_id.to_string());
    println!();
    for line in start.announcement.lines().filter(|l| !l.trim().is_empty()) {
        println!("  {}", line.bright_magenta());
    }

    let turns = coordinator.run_exchange(session_id, options.rounds).await?;
    for turn in &turns {
        print_turn(turn);
    }

    coordinator.complete(session_id).await?;
    let session = coordinator.session(session_id).await?;

    println!();
    display::success(&format!(
        "Negotiation completed after {} turns",
        session.turns().len()
    ));

    if let Some(out) = &options.out {
        let report = json!({
            "session_id": session.id(),
            "first_speaker": start.first_speaker_name,
            "turns": session.turns(),
            "trace": session.trace(),
        });
        fs::write(out, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", out.display()))?;
        display::labeled("Session log", &out.display().to_string());
    }

    Ok(turns)
}

async fn register(
    coordinator: &NegotiationCoordinator,
    name: &str,
    briefing_dir: Option<&Path>,
) -> anyhow::Result<AgentId> {
    let agent = coordinator
        .register_agent(name, Persona::negotiator(name))
        .await;

    let Some(dir) = briefing_dir else {
        display::info(&format!("{}: no briefing", name));
        return Ok(agent);
    };

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading briefing directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let (mut records, mut narrative) = (0, 0);
    for path in entries {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        match coordinator
            .ingest_briefing_file(agent, &file_name, &contents)
            .await?
        {
            BriefingItem::Record(_) => records += 1,
            BriefingItem::Narrative => narrative += 1,
        }
    }

    display::success(&format!(
        "{}: {} signed records, {} narrative files",
        name.bright_white(),
        records,
        narrative
    ));
    Ok(agent)
}

fn print_turn(turn: &ConversationTurn) {
    display::turn(&turn.speaker_name, &turn.content);

    if let Some(evidence) = &turn.evidence {
        for expression in &evidence.expressions {
            let mark = if expression.evaluated_result {
                "✓".bright_green()
            } else {
                "✗".bright_red()
            };
            println!("    {} {}", mark, expression.text.bright_black());
        }
    }

    if let Some(summary) = turn.proof.as_ref().and_then(|p| p.summary()) {
        println!("    {}", "Proof attached".bright_green());
        for line in summary.lines() {
            println!("      {}", line.bright_black());
        }
    }
}
