//! Global memory layout.
//!
//! Runs once over all modules after per-module analysis: packs `@zp`
//! variables into the zero-page window, verifies `@map` ranges against each
//! other and against the zero-page plan, and sums storage statistics. The
//! build is deterministic: modules are visited in name order and
//! declarations in source order, so repeated compilations of the same input
//! produce byte-identical address plans.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::{AnalysisStore, DeclKind, MapForm, Program, StorageClass};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode};
use crate::source::SourceSpan;
use crate::target::TargetDescriptor;

/// One variable placed in the zero page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroPageEntry {
    pub name: String,
    pub module: String,
    pub address: u16,
    pub size: usize,
    pub is_exported: bool,
    pub location: SourceSpan,
}

/// The address form a `@map` declaration used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapEntryForm {
    Simple,
    Range,
    Sequential,
    Explicit,
}

/// One `@map` binding with its computed address envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub name: String,
    pub module: String,
    pub start_address: u16,
    pub end_address: u16,
    pub size: usize,
    pub form: MapEntryForm,
    pub is_exported: bool,
    pub location: SourceSpan,
}

/// Storage statistics reported alongside the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub zero_page_used: usize,
    pub zero_page_available: usize,
    pub zero_page_usage_percent: f64,
    pub ram_bytes: usize,
    pub data_bytes: usize,
    pub module_count: usize,
}

/// The global memory plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryLayout {
    pub zero_page: Vec<ZeroPageEntry>,
    pub maps: Vec<MapEntry>,
    pub statistics: MemoryStatistics,
}

impl MemoryLayout {
    /// Address of a zero-page variable, if it was placed.
    #[must_use]
    pub fn zp_address(&self, module: &str, name: &str) -> Option<u16> {
        self.zero_page
            .iter()
            .find(|e| e.module == module && e.name == name)
            .map(|e| e.address)
    }

    /// Start address of a `@map` binding.
    #[must_use]
    pub fn map_address(&self, module: &str, name: &str) -> Option<u16> {
        self.maps
            .iter()
            .find(|e| e.module == module && e.name == name)
            .map(|e| e.start_address)
    }
}

/// Builds the global layout from every module's AST and analysis results.
///
/// `modules` must iterate deterministically; the builder re-sorts by module
/// name so registration order cannot leak into addresses.
pub fn build_memory_layout(
    modules: &IndexMap<String, (&Program, &AnalysisStore)>,
    target: &TargetDescriptor,
    diagnostics: &mut DiagnosticBag,
) -> MemoryLayout {
    let mut layout = MemoryLayout {
        statistics: MemoryStatistics {
            zero_page_available: target.zero_page_capacity(),
            module_count: modules.len(),
            ..MemoryStatistics::default()
        },
        ..MemoryLayout::default()
    };

    let mut names: Vec<&String> = modules.keys().collect();
    names.sort();

    // 1. Zero-page packing: big first for tight packing, source order as
    //    the tiebreak so the plan is reproducible.
    let mut zp_candidates: Vec<ZeroPageEntry> = Vec::new();
    for name in &names {
        let (program, store) = &modules[name.as_str()];
        for decl in &program.decls {
            let DeclKind::Variable(var) = &decl.kind else { continue };
            if var.storage != StorageClass::ZeroPage {
                continue;
            }
            let size = store.type_of(decl.id).size().max(1);
            zp_candidates.push(ZeroPageEntry {
                name: var.name.clone(),
                module: (*name).clone(),
                address: 0,
                size,
                is_exported: var.is_exported,
                location: decl.location,
            });
        }
    }
    zp_candidates.sort_by(|a, b| b.size.cmp(&a.size));

    let mut cursor = usize::from(target.zero_page.start);
    let limit = usize::from(target.zero_page.end);
    let mut overflowed = false;
    let total_needed: usize = zp_candidates.iter().map(|e| e.size).sum();
    for mut entry in zp_candidates {
        if cursor + entry.size - 1 > limit {
            if !overflowed {
                overflowed = true;
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::ZpOverflow,
                        format!(
                            "zero page overflow: {total_needed} bytes requested, {} available",
                            target.zero_page_capacity()
                        ),
                        entry.location,
                    )
                    .with_suggestion("move large variables out of @zp or shrink their types"),
                );
            }
            continue;
        }
        entry.address = u16::try_from(cursor).unwrap_or(u16::MAX);
        cursor += entry.size;
        layout.statistics.zero_page_used += entry.size;
        layout.zero_page.push(entry);
    }

    // 2. @map ranges: pairwise non-overlap, then non-overlap with the
    //    zero-page plan.
    for name in &names {
        let (program, store) = &modules[name.as_str()];
        for decl in &program.decls {
            let DeclKind::Map(map) = &decl.kind else { continue };
            let size = store.type_of(decl.id).size().max(1);
            let (start, end, form) = match &map.form {
                MapForm::Simple { address } => {
                    let span = u16::try_from(size - 1).unwrap_or(u16::MAX);
                    (*address, address.saturating_add(span), MapEntryForm::Simple)
                }
                MapForm::Range { start, end } => (*start, *end, MapEntryForm::Range),
                MapForm::Sequential { start } => {
                    let span = u16::try_from(size - 1).unwrap_or(u16::MAX);
                    (*start, start.saturating_add(span), MapEntryForm::Sequential)
                }
                MapForm::Explicit { addresses } => {
                    let start = addresses.iter().copied().min().unwrap_or(0);
                    let end = addresses.iter().copied().max().unwrap_or(0);
                    (start, end, MapEntryForm::Explicit)
                }
            };
            let entry = MapEntry {
                name: map.name.clone(),
                module: (*name).clone(),
                start_address: start,
                end_address: end.max(start),
                size,
                form,
                is_exported: map.is_exported,
                location: decl.location,
            };
            for existing in &layout.maps {
                if ranges_overlap(existing.start_address, existing.end_address, entry.start_address, entry.end_address)
                {
                    diagnostics.report(
                        DiagnosticCode::MapOverlap,
                        format!(
                            "@map '{}' ({}) at {} overlaps @map '{}' ({}) declared at {}",
                            entry.name,
                            entry.module,
                            range_display(entry.start_address, entry.end_address),
                            existing.name,
                            existing.module,
                            existing.location,
                        ),
                        entry.location,
                    );
                }
            }
            for zp in &layout.zero_page {
                let zp_end = zp.address + u16::try_from(zp.size - 1).unwrap_or(0);
                if ranges_overlap(zp.address, zp_end, entry.start_address, entry.end_address) {
                    diagnostics.report(
                        DiagnosticCode::ZpMapOverlap,
                        format!(
                            "@map '{}' at {} overlaps zero-page variable '{}' at ${:02X}",
                            entry.name,
                            range_display(entry.start_address, entry.end_address),
                            zp.name,
                            zp.address,
                        ),
                        entry.location,
                    );
                }
            }
            layout.maps.push(entry);
        }
    }

    // 3. Storage statistics.
    for name in &names {
        let (program, store) = &modules[name.as_str()];
        for decl in &program.decls {
            let DeclKind::Variable(var) = &decl.kind else { continue };
            let size = store.type_of(decl.id).size().max(1);
            match var.storage {
                StorageClass::Ram | StorageClass::Auto => layout.statistics.ram_bytes += size,
                StorageClass::Data => layout.statistics.data_bytes += size,
                StorageClass::ZeroPage => {}
            }
        }
    }
    layout.statistics.zero_page_usage_percent =
        100.0 * layout.statistics.zero_page_used as f64 / layout.statistics.zero_page_available.max(1) as f64;

    layout
}

const fn ranges_overlap(s1: u16, e1: u16, s2: u16, e2: u16) -> bool {
    s1 <= e2 && s2 <= e1
}

fn range_display(start: u16, end: u16) -> String {
    if start == end {
        format!("${start:04X}")
    } else {
        format!("${start:04X}-${end:04X}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;
    use crate::types::TypeInfo;

    fn annotated(program: &Program, sizes: &[(crate::ast::NodeId, TypeInfo)]) -> AnalysisStore {
        let mut store = AnalysisStore::new();
        for (node, ty) in sizes {
            store.set_type(*node, ty.clone());
        }
        store
    }

    #[test]
    fn zero_page_packs_descending_by_size_deterministically() {
        let mut b = AstBuilder::new();
        let small = b.global_var("flag", StorageClass::ZeroPage, Some(b.ty("byte")), None);
        let big = b.global_var("cursor", StorageClass::ZeroPage, Some(b.ty("word")), None);
        let flag_id = small.id;
        let cursor_id = big.id;
        let program = b.program("main", vec![small, big]);
        let store = annotated(&program, &[(flag_id, TypeInfo::Byte), (cursor_id, TypeInfo::Word)]);

        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &store));
        let mut diags = DiagnosticBag::new();
        let layout = build_memory_layout(&modules, &TargetDescriptor::c64(), &mut diags);

        assert!(diags.is_empty());
        // The word goes first (larger), starting at the window base.
        assert_eq!(layout.zp_address("main", "cursor"), Some(0x90));
        assert_eq!(layout.zp_address("main", "flag"), Some(0x92));
        assert_eq!(layout.statistics.zero_page_used, 3);
    }

    #[test]
    fn zero_page_overflow_is_fatal_and_reports_capacity() {
        let mut b = AstBuilder::new();
        let mut decls = Vec::new();
        let mut ids = Vec::new();
        for index in 0..60 {
            let decl = b.global_var(format!("v{index}"), StorageClass::ZeroPage, Some(b.ty("word")), None);
            ids.push(decl.id);
            decls.push(decl);
        }
        let program = b.program("main", decls);
        let pairs: Vec<_> = ids.into_iter().map(|id| (id, TypeInfo::Word)).collect();
        let store = annotated(&program, &pairs);

        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &store));
        let mut diags = DiagnosticBag::new();
        let layout = build_memory_layout(&modules, &TargetDescriptor::c64(), &mut diags);

        assert_eq!(diags.with_code(DiagnosticCode::ZpOverflow).count(), 1);
        assert!(diags.has_errors());
        assert_eq!(layout.statistics.zero_page_available, 112);
        // 56 words fit into 112 bytes; the rest spill.
        assert_eq!(layout.statistics.zero_page_used, 112);
    }

    #[test]
    fn overlapping_maps_report_both_locations() {
        let mut b = AstBuilder::new();
        b.at(1, 1);
        let first = b.map_decl("a", MapForm::Simple { address: 0xD020 }, b.ty("byte"));
        b.at(2, 1);
        let second = b.map_decl("b", MapForm::Simple { address: 0xD020 }, b.ty("byte"));
        let a_id = first.id;
        let b_id = second.id;
        let program = b.program("main", vec![first, second]);
        let store = annotated(&program, &[(a_id, TypeInfo::Byte), (b_id, TypeInfo::Byte)]);

        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &store));
        let mut diags = DiagnosticBag::new();
        build_memory_layout(&modules, &TargetDescriptor::c64(), &mut diags);

        let overlap: Vec<_> = diags.with_code(DiagnosticCode::MapOverlap).collect();
        assert_eq!(overlap.len(), 1);
        // The message names the other entry and its location; the
        // diagnostic's own location is the second declaration.
        assert!(overlap[0].message.contains('a'));
        assert_eq!(overlap[0].location.start.line, 2);
        assert!(overlap[0].message.contains("1:1"));
    }

    #[test]
    fn map_and_zero_page_never_share_addresses() {
        let mut b = AstBuilder::new();
        let zp = b.global_var("fast", StorageClass::ZeroPage, Some(b.ty("byte")), None);
        let map = b.map_decl("weird", MapForm::Simple { address: 0x90 }, b.ty("byte"));
        let zp_id = zp.id;
        let map_id = map.id;
        let program = b.program("main", vec![zp, map]);
        let store = annotated(&program, &[(zp_id, TypeInfo::Byte), (map_id, TypeInfo::Byte)]);

        let mut modules = IndexMap::new();
        modules.insert("main".to_owned(), (&program, &store));
        let mut diags = DiagnosticBag::new();
        build_memory_layout(&modules, &TargetDescriptor::c64(), &mut diags);
        assert_eq!(diags.with_code(DiagnosticCode::ZpMapOverlap).count(), 1);
    }
}
