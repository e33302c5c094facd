//! Prompt assembly for chunk extraction and result merging.

use specsum_chat::ChatMessage;
use specsum_ingest::Chunk;

pub const EXTRACTION_SYSTEM: &str = "You are a construction materials extraction assistant. \
You read construction specification documents and extract every material, product and \
applicable technical standard they require.";

pub const MERGE_SYSTEM: &str = "You are a construction estimating assistant. You combine \
partial material extractions from one specification section into a single, deduplicated \
bid-ready report.";

const REPORT_FORMAT: &str = "Structure the report in exactly these three sections, in this order:

1. PROJECT HEADER
   Owner / developer name, project name and project address, when present in the text.

2. QUICK SUMMARY
   A bid assessment split into:
   - Standard requirements
   - Premium or unusual requirements that affect cost, complexity or schedule

3. FULL DETAILED BREAKDOWN
   Organized by material category (masonry units, mortar, grout, reinforcement, \
ties and anchors, flashing, drainage, accessories, and any other category present). \
For each category list the required materials, the required standards (ASTM, ACI, TMS, etc.) \
and explicit call-outs of atypical or cost-increasing items.";

const DEDUP_RULE: &str = "Each material and each standard must appear exactly once in the \
final report, even when several portions mention it. Portions overlap at their boundaries, \
so repeated text is expected and must be merged, not listed twice.";

/// Label prefixed to each extraction result in the merge request.
pub fn portion_label(index: usize, total: usize) -> String {
    format!("=== PORTION {} OF {} ===", index, total)
}

/// Messages for one chunk. A lone chunk asks for the final report directly.
pub fn extraction_messages(chunk: &Chunk) -> Vec<ChatMessage> {
    let user = if chunk.total <= 1 {
        format!(
            "Extract all materials and applicable technical standards from the following \
construction specification section and flag unusual or premium requirements.\n\n\
{REPORT_FORMAT}\n\nSection text:\n{}",
            chunk.text
        )
    } else {
        format!(
            "This is part {} of {} of a construction specification section. \
Extract every material and applicable technical standard mentioned in this part, \
and flag unusual or premium requirements. Report only what this part contains; \
do not assume context from other parts.\n\nSection text (part {} of {}):\n{}",
            chunk.index, chunk.total, chunk.index, chunk.total, chunk.text
        )
    };

    vec![ChatMessage::system(EXTRACTION_SYSTEM), ChatMessage::user(user)]
}

/// Merge request carrying every extraction result in original order.
pub fn merge_messages(results: &[String]) -> Vec<ChatMessage> {
    let total = results.len();
    let portions = results
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}\n{}", portion_label(i + 1, total), text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let user = format!(
        "The following {total} portions are material extractions from consecutive parts of \
one specification section. Combine them into one report.\n\n{DEDUP_RULE}\n\n\
{REPORT_FORMAT}\n\n{portions}"
    );

    vec![ChatMessage::system(MERGE_SYSTEM), ChatMessage::user(user)]
}
