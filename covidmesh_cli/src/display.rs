use std::collections::BTreeMap;

use comfy_table::{presets::NOTHING, *};
use covidmesh::regions::RegionDefinition;
use covidmesh::resolver::Resolution;
use covidmesh::summary::RunSummary;
use itertools::Itertools;

/// Number of individual problems listed under the summary table.
const MAX_LISTED: usize = 10;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn bold(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = new_table();
    table
        .add_row(vec![bold("Counties"), summary.counties.into()])
        .add_row(vec![bold("States"), summary.states.into()])
        .add_row(vec![bold("Files written"), summary.files_written.into()])
        .add_row(vec![bold("Skipped lines"), summary.skipped_lines().into()])
        .add_row(vec![
            bold("Unresolved keys"),
            summary.unresolved_keys().count().into(),
        ])
        .add_row(vec![
            bold("Region integrity violations"),
            summary.integrity_violations.len().into(),
        ])
        .add_row(vec![
            bold("Zero population skips"),
            summary.zero_population_skips.into(),
        ])
        .add_row(vec![
            bold("Name hash collisions"),
            summary.name_hash_collisions.len().into(),
        ])
        .add_row(vec![
            bold("Codes without mobility"),
            summary.empty_mobility.len().into(),
        ]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}

pub fn sources_table(summary: &RunSummary) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        bold("Source"),
        bold("Lines read"),
        bold("Skipped"),
        bold("Unresolved"),
    ]);
    for (name, report) in &summary.reports {
        table.add_row(vec![
            Cell::new(name),
            report.lines_read.into(),
            report.skipped.len().into(),
            report.unresolved.len().into(),
        ]);
    }
    table
}

pub fn display_summary(summary: &RunSummary) -> anyhow::Result<()> {
    println!("\n{}", summary_table(summary));
    println!("\n{}", sources_table(summary));

    let skipped = summary
        .reports
        .iter()
        .flat_map(|(_, report)| report.skipped.iter())
        .take(MAX_LISTED)
        .map(|s| format!("  {} line {}: {}", s.source, s.line, s.reason))
        .collect_vec();
    if !skipped.is_empty() {
        println!("\nSkipped lines (first {MAX_LISTED}):\n{}", skipped.join("\n"));
    }
    let unresolved = summary.unresolved_keys().take(MAX_LISTED).join("\n  ");
    if !unresolved.is_empty() {
        println!("\nUnresolved keys (first {MAX_LISTED}):\n  {unresolved}");
    }
    if !summary.integrity_violations.is_empty() {
        let violations = summary
            .integrity_violations
            .iter()
            .map(|v| match v.case_type {
                Some(case_type) => format!("  {} ({case_type}): {}", v.region, v.kind),
                None => format!("  {}: {}", v.region, v.kind),
            })
            .join("\n");
        println!("\nRegion integrity violations:\n{violations}");
    }
    Ok(())
}

pub fn regions_table(regions: &BTreeMap<String, RegionDefinition>) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        bold("Region"),
        bold("Description"),
        bold("Members"),
        bold("Reported under"),
    ]);
    for (code, definition) in regions {
        table.add_row(vec![
            Cell::new(code),
            Cell::new(definition.description.as_deref().unwrap_or_default()),
            Cell::new(definition.members.join(", ")),
            Cell::new(definition.reported_under.as_deref().unwrap_or_default()),
        ]);
    }
    table
}

pub fn display_regions(regions: &BTreeMap<String, RegionDefinition>) -> anyhow::Result<()> {
    println!("\n{}", regions_table(regions));
    Ok(())
}

pub fn describe_resolution(resolution: &Resolution) -> String {
    match resolution {
        Resolution::County(code) if code.is_synthetic() => format!("synthetic county {code}"),
        Resolution::County(code) => format!("county {code}"),
        Resolution::Territory(code) => format!("territory, reported as county {code}"),
        Resolution::Unresolved(key) => format!("unresolved, no code for '{key}'"),
        Resolution::Ignored(code) => format!("ignored code {code}"),
    }
}
