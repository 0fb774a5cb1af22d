// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Coverage report rendering.
//!
//! Two renderings are supported: a line-oriented text coverfile
//! (`mode: <count|set>` header followed by one
//! `<file>:<ls>.<cs>,<le>.<ce> 1 <count>` row per statement) and an HTML
//! report that groups statements by source file into per-file coverage
//! blocks. Both accept an optional contract-name filter.

use std::{collections::BTreeMap, io};

use super::{CoverageCollector, CoverageMode};

/// One rendered statement block within a file profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileBlock {
    /// 1-based start line.
    pub start_line: i64,
    /// 1-based start column.
    pub start_col: i64,
    /// 1-based end line.
    pub end_line: i64,
    /// 1-based end column.
    pub end_col: i64,
    /// Number of statements in the block, always 1 for soldep markers.
    pub num_stmt: u32,
    /// Hit count, reduced to 0/1 in set mode.
    pub count: u64,
}

/// All coverage blocks recorded for one source file.
#[derive(Debug, Clone)]
pub struct FileProfile {
    /// Path of the source file.
    pub file_name: String,
    /// Mode the counts were rendered under.
    pub mode: CoverageMode,
    /// Blocks ordered by source position.
    pub blocks: Vec<ProfileBlock>,
}

impl FileProfile {
    /// Fraction of blocks with a nonzero count, in percent.
    pub fn percent_covered(&self) -> f64 {
        if self.blocks.is_empty() {
            return 0.0;
        }
        let hit = self.blocks.iter().filter(|b| b.count > 0).count();
        hit as f64 * 100.0 / self.blocks.len() as f64
    }
}

impl CoverageCollector {
    /// Writes the text coverfile. Rows are sorted by descriptor for
    /// deterministic output.
    pub fn report_text<W: io::Write>(
        &self,
        out: &mut W,
        filter_names: &[String],
    ) -> io::Result<()> {
        let registry = self.inner.read();

        writeln!(out, "mode: {}", self.mode)?;

        let mut rows: Vec<(String, u64)> = registry
            .statements
            .iter()
            .filter(|(desc, _)| {
                filter_names.is_empty() || filter_names.contains(&desc.contract_name)
            })
            .map(|(desc, count)| (desc.to_string(), *count))
            .collect();
        rows.sort();

        for (descriptor, count) in rows {
            let count = match self.mode {
                CoverageMode::Count => count,
                CoverageMode::Set => u64::from(count > 0),
            };
            writeln!(out, "{descriptor} 1 {count}")?;
        }

        Ok(())
    }

    /// Snapshots the registry into per-file profiles, ordered by file name.
    pub fn profiles(&self, filter_names: &[String]) -> Vec<FileProfile> {
        let registry = self.inner.read();

        let mut by_file: BTreeMap<String, Vec<ProfileBlock>> = BTreeMap::new();
        for (desc, count) in &registry.statements {
            if !filter_names.is_empty() && !filter_names.contains(&desc.contract_name) {
                continue;
            }

            let count = match self.mode {
                CoverageMode::Count => *count,
                CoverageMode::Set => u64::from(*count > 0),
            };

            by_file.entry(desc.src_location.clone()).or_default().push(ProfileBlock {
                start_line: desc.line_start,
                start_col: desc.col_start,
                end_line: desc.line_end,
                end_col: desc.col_end,
                num_stmt: 1,
                count,
            });
        }

        by_file
            .into_iter()
            .map(|(file_name, mut blocks)| {
                blocks.sort_by_key(|b| (b.start_line, b.start_col, b.end_line, b.end_col));
                FileProfile { file_name, mode: self.mode, blocks }
            })
            .collect()
    }

    /// Writes an HTML report with one coverage block table per source file.
    pub fn report_html<W: io::Write>(
        &self,
        out: &mut W,
        filter_names: &[String],
    ) -> io::Result<()> {
        let profiles = self.profiles(filter_names);

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html><head><meta charset=\"utf-8\"/>")?;
        writeln!(out, "<title>soldep coverage report</title>")?;
        writeln!(
            out,
            "<style>body{{font-family:monospace}}table{{border-collapse:collapse}}\
             td,th{{border:1px solid #999;padding:2px 8px}}\
             .hit{{background:#cfc}}.miss{{background:#fcc}}</style>"
        )?;
        writeln!(out, "</head><body>")?;
        writeln!(out, "<h1>Coverage ({} mode)</h1>", self.mode)?;

        for profile in &profiles {
            writeln!(
                out,
                "<h2>{} &mdash; {:.1}%</h2>",
                html_escape(&profile.file_name),
                profile.percent_covered()
            )?;
            writeln!(out, "<table><tr><th>location</th><th>statements</th><th>count</th></tr>")?;
            for block in &profile.blocks {
                writeln!(
                    out,
                    "<tr class=\"{}\"><td>{}.{},{}.{}</td><td>{}</td><td>{}</td></tr>",
                    if block.count > 0 { "hit" } else { "miss" },
                    block.start_line,
                    block.start_col,
                    block.end_line,
                    block.end_col,
                    block.num_stmt,
                    block.count,
                )?;
            }
            writeln!(out, "</table>")?;
        }

        writeln!(out, "</body></html>")?;
        Ok(())
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
