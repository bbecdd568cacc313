//! `prexsyn inspect`: header and payload summary of a cache file.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use prexsyn_core::{
    BuildingBlockList, ChemicalSpaceDefinition, ReactionList, Synthesis, SynthesisVector, Token,
};
use prexsyn_pack::{PackFlags, PackHeader, PackKind};

pub fn run(path: &Path, limit: usize, json: bool) -> Result<String> {
    let header = prexsyn_pack::peek_header(path)
        .with_context(|| format!("reading header of {}", path.display()))?;
    if json {
        return Ok(header_json(&header)? + "\n");
    }

    let mut out = String::new();
    writeln!(out, "--- {} ---", path.display())?;
    writeln!(out, "  Kind:     {}", header.kind)?;
    writeln!(out, "  Version:  {}", header.version)?;
    writeln!(out, "  Items:    {}", header.item_count)?;
    writeln!(out, "  Payload:  {} bytes", header.payload_len)?;
    writeln!(out, "  Flags:    {}", flag_names(header.flags))?;
    writeln!(out)?;

    let ctx = || format!("loading {}", path.display());
    match header.kind {
        PackKind::BuildingBlocks => {
            let blocks = BuildingBlockList::load(path).with_context(ctx)?;
            writeln!(out, "Building blocks ({}):", blocks.len())?;
            for (i, block) in blocks.iter().take(limit).enumerate() {
                writeln!(out, "  [{i}] {} (source #{})", block.molecule, block.original_index)?;
            }
            more(&mut out, blocks.len(), limit)?;
        }
        PackKind::Reactions => {
            let reactions = ReactionList::load(path).with_context(ctx)?;
            writeln!(out, "Reactions ({}):", reactions.len())?;
            for (i, entry) in reactions.iter().take(limit).enumerate() {
                writeln!(
                    out,
                    "  [{i}] {} (arity {}, source #{})",
                    entry.template.smarts(),
                    entry.template.arity(),
                    entry.original_index
                )?;
            }
            more(&mut out, reactions.len(), limit)?;
        }
        PackKind::ChemicalSpace => {
            let space = ChemicalSpaceDefinition::load(path).with_context(ctx)?;
            write_space(&mut out, &space)?;
        }
        PackKind::Synthesis => {
            let synthesis = Synthesis::load(path).with_context(ctx)?;
            write_synthesis(&mut out, &synthesis)?;
        }
        PackKind::SynthesisVector => {
            let routes = SynthesisVector::load(path).with_context(ctx)?;
            writeln!(out, "Routes ({}):", routes.len())?;
            for (i, route) in routes.iter().take(limit).enumerate() {
                writeln!(out, "  [{i}] {}", postfix(route))?;
            }
            more(&mut out, routes.len(), limit)?;
        }
    }
    Ok(out)
}

fn header_json(header: &PackHeader) -> Result<String> {
    let value = serde_json::json!({
        "kind": header.kind.as_str(),
        "version": header.version.to_string(),
        "item_count": header.item_count,
        "payload_len": header.payload_len,
        "flags": {
            "has_secondary": header.flags.has(PackFlags::HAS_SECONDARY),
            "has_index": header.flags.has(PackFlags::HAS_INDEX),
        },
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn flag_names(flags: PackFlags) -> String {
    let mut names = Vec::new();
    if flags.has(PackFlags::HAS_INDEX) {
        names.push("index");
    }
    if flags.has(PackFlags::HAS_SECONDARY) {
        names.push("secondary");
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn more(out: &mut String, total: usize, limit: usize) -> std::fmt::Result {
    if total > limit {
        writeln!(out, "  ... {} more", total - limit)?;
    }
    Ok(())
}

fn write_space(out: &mut String, space: &ChemicalSpaceDefinition) -> std::fmt::Result {
    writeln!(out, "Chemical space:")?;
    writeln!(out, "  Building blocks:           {}", space.num_building_blocks())?;
    writeln!(out, "  Reactions:                 {}", space.num_reactions())?;
    writeln!(
        out,
        "  Secondary building blocks: {}",
        space.num_secondary_building_blocks()
    )?;
    writeln!(out, "  Primary links:             {}", space.primary_index().total_links())?;
    writeln!(out, "  Secondary links:           {}", space.secondary_index().total_links())?;

    let unusable: Vec<String> = (0..space.num_reactions())
        .filter(|&r| !space.primary_index().is_satisfiable(r))
        .map(|r| r.to_string())
        .collect();
    if !unusable.is_empty() {
        writeln!(out, "  Reactions with an empty slot: {}", unusable.join(", "))?;
    }
    Ok(())
}

fn write_synthesis(out: &mut String, synthesis: &Synthesis) -> std::fmt::Result {
    writeln!(out, "Route:")?;
    writeln!(out, "  Postfix:   {}", postfix(synthesis))?;
    writeln!(out, "  Reactions: {}", synthesis.count_reactions())?;
    writeln!(out, "  Stack:     {}", synthesis.stack_size())?;
    if let Some(top) = synthesis.top() {
        let products: Vec<&str> = top.iter().map(|m| m.smiles()).collect();
        writeln!(out, "  Products:  {}", products.join(" "))?;
    }
    Ok(())
}

fn postfix(synthesis: &Synthesis) -> String {
    synthesis
        .postfix_notation()
        .iter()
        .map(|token| match token {
            Token::Molecule {
                molecule,
                building_block: Some(i),
            } => format!("{molecule}#{i}"),
            Token::Molecule { molecule, .. } => molecule.to_string(),
            Token::Reaction { index: Some(i), .. } => format!("R{i}"),
            Token::Reaction { template, .. } => format!("[{}]", template.smarts()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
