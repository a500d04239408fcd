//! Chunk boundary planning and starting-state propagation.

use velocsv_scan::{find_row_end, DualStateStats};

/// Carve the post-header region into ranges that each end just past an
/// unquoted row terminator (or at input end). Advancing by `target` bytes
/// and then scanning forward to the next row boundary keeps ranges close to
/// the target size while guaranteeing the union partitions the region.
pub fn plan_chunk_ranges(
    data: &[u8],
    data_start: usize,
    target: usize,
    quote: u8,
) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let size = data.len();
    let mut offset = data_start;
    let target = target.max(1);

    while offset < size {
        let mut probe = (offset + target).min(size);
        let chunk_end = if probe >= size {
            size
        } else {
            let mut end = find_row_end(data, probe, quote);
            // A pathological row longer than the target defers the boundary
            // further out.
            while end == probe && end < size {
                probe = (probe + target).min(size);
                end = find_row_end(data, probe, quote);
            }
            end
        };
        ranges.push((offset, chunk_end));
        offset = chunk_end;
    }

    ranges
}

/// Resolve each chunk's starting quote state from the analysis results.
/// The first chunk starts outside; every later chunk starts in whatever
/// state its predecessor ended in, which depends on the state the
/// predecessor itself started in.
pub fn link_starting_states(analyses: &[DualStateStats]) -> Vec<bool> {
    let mut use_inside = vec![false; analyses.len()];
    for i in 1..analyses.len() {
        use_inside[i] = chunk_ends_inside(&analyses[i - 1], use_inside[i - 1]);
    }
    use_inside
}

/// Ending state of a chunk given the starting state it was parsed with.
/// The analysis records the ending state for an outside start; an inside
/// start flips it (the chunk contributes one total parity toggle either
/// way).
pub fn chunk_ends_inside(analysis: &DualStateStats, started_inside: bool) -> bool {
    if started_inside {
        !analysis.ends_inside_starting_outside
    } else {
        analysis.ends_inside_starting_outside
    }
}

/// Row count to expect when parsing with the given starting state.
pub fn expected_rows(analysis: &DualStateStats, started_inside: bool) -> usize {
    if started_inside {
        analysis.rows_if_started_inside
    } else {
        analysis.rows_if_started_outside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocsv_scan::analyze_chunk_dual_state;

    #[test]
    fn ranges_partition_the_region() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.extend_from_slice(format!("row{i},value{i}\n").as_bytes());
        }
        let ranges = plan_chunk_ranges(&data, 0, 64, b'"');
        assert!(ranges.len() > 1);
        assert_eq!(ranges[0].0, 0);
        assert_eq!(ranges.last().unwrap().1, data.len());
        for w in ranges.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
        // every boundary except the last falls right after a newline
        for &(_, end) in &ranges[..ranges.len() - 1] {
            assert_eq!(data[end - 1], b'\n');
        }
    }

    #[test]
    fn boundary_inside_quoted_field_is_allowed() {
        // Probing from the middle of a quoted field can land a boundary on
        // a quoted newline; the dual-state linking is what repairs the
        // interpretation, not the planner. The planner only promises a
        // partition whose cuts sit right after some terminator byte.
        let data = b"a\n\"line one\nline two\nline three\",x\nb\n".to_vec();
        let ranges = plan_chunk_ranges(&data, 0, 4, b'"');
        assert!(ranges.len() > 1);
        assert_eq!(ranges[0].0, 0);
        assert_eq!(ranges.last().unwrap().1, data.len());
        for w in ranges.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
        for &(_, end) in &ranges[..ranges.len() - 1] {
            assert!(data[end - 1] == b'\n' || data[end - 1] == b'\r');
        }
    }

    #[test]
    fn single_chunk_when_target_exceeds_input() {
        let data = b"a,b\n1,2\n";
        let ranges = plan_chunk_ranges(data, 0, 1 << 20, b'"');
        assert_eq!(ranges, vec![(0, data.len())]);
    }

    #[test]
    fn linking_propagates_quote_state() {
        // Chunk 0 ends inside a quote; chunk 1 must start inside and its
        // ending state flips accordingly.
        let c0 = analyze_chunk_dual_state(b"a\n\"open\n", b'"');
        assert!(c0.ends_inside_starting_outside);
        let c1 = analyze_chunk_dual_state(b"still quoted\" ,x\n", b'"');
        let states = link_starting_states(&[c0, c1]);
        assert_eq!(states, vec![false, true]);
        // chunk 1 started inside and saw one quote: it ends outside
        assert!(!chunk_ends_inside(&c1, true));
    }

    #[test]
    fn expected_rows_picks_the_right_side() {
        let s = DualStateStats {
            rows_if_started_outside: 10,
            rows_if_started_inside: 7,
            ends_inside_starting_outside: false,
        };
        assert_eq!(expected_rows(&s, false), 10);
        assert_eq!(expected_rows(&s, true), 7);
    }
}
