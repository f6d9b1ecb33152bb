use crate::db::models::{HeadToHead, Match, TeamForm};

/// Recent finished matches considered for a team's form.
pub const FORM_WINDOW: usize = 10;
/// Most recent meetings considered for head-to-head.
pub const H2H_WINDOW: usize = 5;
/// Goal rate assumed for a team with no history.
pub const DEFAULT_AVG_GOALS: f64 = 1.5;

impl TeamForm {
    /// Points per game, 0 when nothing has been played.
    pub fn points_per_game(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }
        (3 * self.wins + self.draws) as f64 / self.matches_played as f64
    }

    pub fn record(&self) -> String {
        format!("{}W-{}D-{}L", self.wins, self.draws, self.losses)
    }
}

/// Summarise a team's form from its recent matches (newest first).
///
/// Matches the team did not play or that have no final score are ignored. A team with
/// no usable history gets [`DEFAULT_AVG_GOALS`] in both directions.
pub fn team_form(team_id: i64, league_id: i64, recent: &[Match]) -> TeamForm {
    let mut form = TeamForm {
        team_id,
        league_id,
        matches_played: 0,
        wins: 0,
        draws: 0,
        losses: 0,
        goals_scored: 0,
        goals_conceded: 0,
        avg_goals_scored: DEFAULT_AVG_GOALS,
        avg_goals_conceded: DEFAULT_AVG_GOALS,
    };

    let scored_pairs = recent.iter().filter_map(|m| {
        let (hs, aws) = (m.home_score?, m.away_score?);
        if m.home_team_id == team_id {
            Some((hs, aws))
        } else if m.away_team_id == team_id {
            Some((aws, hs))
        } else {
            None
        }
    });

    for (scored, conceded) in scored_pairs.take(FORM_WINDOW) {
        form.matches_played += 1;
        form.goals_scored += scored.max(0) as u32;
        form.goals_conceded += conceded.max(0) as u32;
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => form.wins += 1,
            std::cmp::Ordering::Equal => form.draws += 1,
            std::cmp::Ordering::Less => form.losses += 1,
        }
    }

    if form.matches_played > 0 {
        let n = form.matches_played as f64;
        form.avg_goals_scored = form.goals_scored as f64 / n;
        form.avg_goals_conceded = form.goals_conceded as f64 / n;
    }
    form
}

/// Count outcomes of recent meetings, oriented as (team_a, team_b) regardless of venue.
pub fn head_to_head(team_a: i64, team_b: i64, meetings: &[Match]) -> HeadToHead {
    let mut h2h = HeadToHead {
        team_a,
        team_b,
        total_matches: 0,
        team_a_wins: 0,
        team_b_wins: 0,
        draws: 0,
    };

    let relevant = meetings.iter().filter(|m| {
        (m.home_team_id == team_a && m.away_team_id == team_b)
            || (m.home_team_id == team_b && m.away_team_id == team_a)
    });

    for m in relevant {
        let (Some(hs), Some(aws)) = (m.home_score, m.away_score) else {
            continue;
        };
        if h2h.total_matches as usize >= H2H_WINDOW {
            break;
        }
        h2h.total_matches += 1;
        let winner = match hs.cmp(&aws) {
            std::cmp::Ordering::Greater => Some(m.home_team_id),
            std::cmp::Ordering::Less => Some(m.away_team_id),
            std::cmp::Ordering::Equal => None,
        };
        match winner {
            Some(id) if id == team_a => h2h.team_a_wins += 1,
            Some(_) => h2h.team_b_wins += 1,
            None => h2h.draws += 1,
        }
    }
    h2h
}
