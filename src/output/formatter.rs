use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::model::TallyBoard;

/// Format the tally board as per-league sections, contributors ordered by
/// score descending with id as the tie-breaker.
pub fn format_board(board: &TallyBoard, use_colors: bool) -> String {
    if board.is_empty() {
        return "No scores tallied.".to_string();
    }

    let mut sections = Vec::with_capacity(board.len());
    for (league_id, contributors) in board {
        let mut rows: Vec<(&String, f64)> =
            contributors.iter().map(|(id, score)| (id, *score)).collect();
        rows.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let width = rows.iter().map(|(id, _)| id.len()).max().unwrap_or(0);
        let mut lines = Vec::with_capacity(rows.len() + 1);
        if use_colors {
            lines.push(format!("{}", league_id.bold()));
        } else {
            lines.push(league_id.clone());
        }
        for (contributor, score) in rows {
            let score = format_score(score);
            // Pad before coloring so escape codes don't count against the
            // column width.
            let padded = format!("{:<width$}", contributor, width = width);
            if use_colors {
                lines.push(format!("  {}  {}", padded.cyan(), score.green()));
            } else {
                lines.push(format!("  {}  {}", padded, score));
            }
        }
        sections.push(lines.join("\n"));
    }

    sections.join("\n\n")
}

/// Scores are whole numbers in practice; only show a fraction when one
/// actually exists.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{}", score as i64)
    } else {
        format!("{:.2}", score)
    }
}

/// Check if stdout is a TTY (for auto-detecting color support)
pub fn should_use_colors() -> bool {
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn board(entries: &[(&str, &str, f64)]) -> TallyBoard {
        let mut board = TallyBoard::new();
        for (league, contributor, score) in entries {
            board
                .entry(league.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(contributor.to_string(), *score);
        }
        board
    }

    #[test]
    fn test_empty_board() {
        assert_eq!(format_board(&TallyBoard::new(), false), "No scores tallied.");
    }

    #[test]
    fn test_contributors_sorted_by_score_desc() {
        let rendered = format_board(
            &board(&[
                ("junior-girls", "alice", 90.0),
                ("junior-girls", "carol", 170.0),
                ("junior-girls", "beth", 90.0),
            ]),
            false,
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "junior-girls");
        assert!(lines[1].starts_with("  carol"));
        // Tied scores fall back to id order.
        assert!(lines[2].starts_with("  alice"));
        assert!(lines[3].starts_with("  beth"));
    }

    #[test]
    fn test_whole_scores_render_without_fraction() {
        let rendered = format_board(&board(&[("open", "x", 90.0), ("open", "y", 85.5)]), false);
        assert!(rendered.contains(" 90"));
        assert!(rendered.contains(" 85.50"));
        assert!(!rendered.contains("90.0"));
    }

    #[test]
    fn test_leagues_render_as_separate_sections() {
        let rendered = format_board(
            &board(&[("league-a", "x", 1.0), ("league-b", "y", 2.0)]),
            false,
        );
        assert_eq!(rendered.split("\n\n").count(), 2);
    }
}
