//! Boundary-condition text files.
//!
//! Whitespace-separated tokens:
//!
//! ```text
//! <total node count>
//! <k> <node_1> ... <node_k>
//! <m> <t_1> <v_1> ... <t_m> <v_m>
//! ...
//! ```
//!
//! Each block assigns one periodic time series to `k` nodes. Node indices are
//! zero-based. A node may appear in at most one block.

use std::path::Path;

use tw_core::{DofId, TimeSeries};

use crate::{ResultsError, ResultsResult};

/// A prescribed value at one DOF.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCondition {
    pub dof: DofId,
    pub series: TimeSeries,
}

struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let inner = text
            .lines()
            .enumerate()
            .flat_map(|(n, line)| {
                let content = line.split('#').next().unwrap_or("");
                content.split_whitespace().map(move |tok| (n + 1, tok))
            });
        Self {
            inner: Box::new(inner),
            last_line: 0,
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let (line, tok) = self.inner.next()?;
        self.last_line = line;
        Some(tok)
    }

    fn error(&self, message: impl Into<String>) -> ResultsError {
        ResultsError::BoundaryParse {
            line: self.last_line,
            message: message.into(),
        }
    }

    fn usize(&mut self, what: &str) -> ResultsResult<usize> {
        let tok = self
            .next_token()
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))?;
        tok.parse()
            .map_err(|_| self.error(format!("invalid {what} '{tok}'")))
    }

    fn f64(&mut self, what: &str) -> ResultsResult<f64> {
        let tok = self
            .next_token()
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))?;
        tok.parse()
            .map_err(|_| self.error(format!("invalid {what} '{tok}'")))
    }
}

/// Parse a boundary-condition file.
///
/// When `mesh_nodes` is given, the header node count must match it and node
/// indices must be in range.
pub fn parse_boundary_conditions(
    text: &str,
    mesh_nodes: Option<usize>,
) -> ResultsResult<Vec<BoundaryCondition>> {
    let mut tokens = Tokens::new(text);
    let total = tokens.usize("node count")?;
    if let Some(n) = mesh_nodes {
        if n != total {
            return Err(ResultsError::NodeCountMismatch { file: total, mesh: n });
        }
    }

    let mut seen = vec![false; total];
    let mut out = Vec::new();
    while let Some(tok) = tokens.next_token() {
        let k: usize = tok
            .parse()
            .map_err(|_| tokens.error(format!("invalid node block size '{tok}'")))?;
        if k == 0 {
            return Err(tokens.error("node block must name at least one node"));
        }
        let mut nodes = Vec::with_capacity(k);
        for _ in 0..k {
            let node = tokens.usize("node index")?;
            if node >= total {
                return Err(tokens.error(format!("node {node} out of range 0..{total}")));
            }
            if seen[node] {
                return Err(tokens.error(format!("node {node} has more than one condition")));
            }
            seen[node] = true;
            nodes.push(node);
        }

        let m = tokens.usize("point count")?;
        let mut points = Vec::with_capacity(m);
        for _ in 0..m {
            let t = tokens.f64("time")?;
            let v = tokens.f64("value")?;
            points.push((t, v));
        }
        let series = TimeSeries::new(points).map_err(|e| tokens.error(e.to_string()))?;

        for node in nodes {
            out.push(BoundaryCondition {
                dof: DofId::from_usize(node),
                series: series.clone(),
            });
        }
    }
    Ok(out)
}

pub fn read_boundary_file(
    path: &Path,
    mesh_nodes: Option<usize>,
) -> ResultsResult<Vec<BoundaryCondition>> {
    let text = std::fs::read_to_string(path)?;
    parse_boundary_conditions(&text, mesh_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
4
2 0 2      # western edge
3 0.0 30.0  3600.0 32.0  7200.0 30.0
1 3
1 0.0 5.0
";

    #[test]
    fn parses_blocks() {
        let bcs = parse_boundary_conditions(SAMPLE, Some(4)).unwrap();
        assert_eq!(bcs.len(), 3);
        assert_eq!(bcs[0].dof.idx(), 0);
        assert_eq!(bcs[1].dof.idx(), 2);
        assert_eq!(bcs[2].dof.idx(), 3);
        assert_eq!(bcs[0].series, bcs[1].series);
        assert!((bcs[0].series.value(1800.0) - 31.0).abs() < 1e-12);
        // periodic with period 7200 s
        assert!((bcs[1].series.value(7200.0 + 3600.0) - 32.0).abs() < 1e-12);
        assert_eq!(bcs[2].series.value(1.0e6), 5.0);
    }

    #[test]
    fn node_count_must_match_mesh() {
        let err = parse_boundary_conditions(SAMPLE, Some(5)).unwrap_err();
        assert!(matches!(
            err,
            ResultsError::NodeCountMismatch { file: 4, mesh: 5 }
        ));
    }

    #[test]
    fn out_of_range_node_reports_line() {
        let err = parse_boundary_conditions("4\n1 9\n1 0 1\n", None).unwrap_err();
        match err {
            ResultsError::BoundaryParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn node_may_not_be_claimed_twice() {
        let text = "3\n1 1\n1 0 1\n1 1\n1 0 2\n";
        assert!(matches!(
            parse_boundary_conditions(text, None),
            Err(ResultsError::BoundaryParse { .. })
        ));
    }

    #[test]
    fn truncated_series_is_rejected() {
        let text = "3\n1 1\n2 0 1 3600\n";
        assert!(matches!(
            parse_boundary_conditions(text, None),
            Err(ResultsError::BoundaryParse { line: 3, .. })
        ));
    }

    #[test]
    fn decreasing_times_are_rejected() {
        let text = "3\n1 1\n2 10 1 5 2\n";
        assert!(parse_boundary_conditions(text, None).is_err());
    }
}
