//! Candidate selection from the `--pick` list.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};

/// Parses a pick list such as `1,3,5` or `2-4,7` into 1-based positions.
///
/// Order of first appearance is kept and repeats are dropped. Every
/// position must lie within `1..=total`.
pub(crate) fn parse_pick(spec: &str, total: usize) -> Result<Vec<usize>> {
    let mut positions = Vec::new();
    let mut seen = HashSet::new();

    for token in spec.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let (start, end) = match token.split_once('-') {
            Some((start, end)) => (parse_position(start)?, parse_position(end)?),
            None => {
                let position = parse_position(token)?;
                (position, position)
            }
        };
        if start > end {
            bail!("Invalid pick range '{token}': start is greater than end");
        }
        if end > total {
            bail!("Pick {end} is out of range: only {total} images were found");
        }
        for position in start..=end {
            if seen.insert(position) {
                positions.push(position);
            }
        }
    }

    if positions.is_empty() {
        bail!("Pick list '{spec}' selects no images");
    }
    Ok(positions)
}

fn parse_position(raw: &str) -> Result<usize> {
    let position = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Invalid pick number '{}'", raw.trim()))?;
    if position == 0 {
        bail!("Pick numbers start at 1");
    }
    Ok(position)
}

/// Returns the candidates at the given 1-based positions, or all of them.
pub(crate) fn select_urls(
    candidates: &[String],
    pick: Option<&str>,
) -> Result<Vec<String>> {
    let Some(spec) = pick else {
        return Ok(candidates.to_vec());
    };
    let positions = parse_pick(spec, candidates.len())?;
    Ok(positions
        .into_iter()
        .filter_map(|position| candidates.get(position - 1).cloned())
        .collect())
}
