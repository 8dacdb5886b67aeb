//! Per-peer kill/death statistics and team score

use std::collections::BTreeMap;

use serde::Serialize;

use super::entity::Team;
use crate::net::PeerId;
use crate::protocol::{PeerStatRecord, TeamScore};

/// Scoreboard collaborator shared by host and client sessions.
pub trait PeerStats {
    /// Register a peer. An empty name falls back to the peer address.
    fn add_peer(&mut self, peer: PeerId, name: &str, team: Team);

    fn remove_peer(&mut self, peer: PeerId);

    fn rename_peer(&mut self, peer: PeerId, name: &str);

    /// Overwrite a peer's kill count, creating the entry when missing.
    fn set_kills(&mut self, peer: PeerId, kills: i16);

    /// Overwrite a peer's death count, creating the entry when missing.
    fn set_deaths(&mut self, peer: PeerId, deaths: i16);

    /// One kill for `killer`, one death for `victim`. Unknown peers are skipped.
    fn record_kill(&mut self, killer: PeerId, victim: PeerId);

    /// `team` lost a round; the other team scores.
    fn record_round_loss(&mut self, team: Team);

    fn kills(&self, peer: PeerId) -> Option<i16>;

    fn deaths(&self, peer: PeerId) -> Option<i16>;

    fn team_score(&self) -> TeamScore;

    fn set_team_score(&mut self, score: TeamScore);

    /// Every peer row, ordered by address
    fn snapshot(&self) -> Vec<PeerStatRecord>;

    /// Replace the whole table with a host snapshot.
    fn load_snapshot(&mut self, records: Vec<PeerStatRecord>) {
        for record in self.snapshot() {
            self.remove_peer(record.peer);
        }
        for record in records {
            self.add_peer(record.peer, &record.name, record.team);
            self.set_kills(record.peer, record.kills);
            self.set_deaths(record.peer, record.deaths);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStat {
    pub name: String,
    pub team: Team,
    pub kills: i16,
    pub deaths: i16,
}

/// In-memory scoreboard
#[derive(Debug, Clone, Default)]
pub struct NetStats {
    peers: BTreeMap<PeerId, PeerStat>,
    team_score: TeamScore,
}

impl NetStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, peer: PeerId) -> Option<&PeerStat> {
        self.peers.get(&peer)
    }

    /// Rows ordered by kills, best first
    pub fn standings(&self) -> Vec<(PeerId, &PeerStat)> {
        let mut rows: Vec<_> = self.peers.iter().map(|(p, s)| (*p, s)).collect();
        rows.sort_by(|a, b| b.1.kills.cmp(&a.1.kills).then(a.0.cmp(&b.0)));
        rows
    }

    fn entry(&mut self, peer: PeerId) -> &mut PeerStat {
        self.peers.entry(peer).or_insert_with(|| PeerStat {
            name: peer.0.ip().to_string(),
            team: 0,
            kills: 0,
            deaths: 0,
        })
    }
}

impl PeerStats for NetStats {
    fn add_peer(&mut self, peer: PeerId, name: &str, team: Team) {
        let name = if name.is_empty() {
            peer.0.ip().to_string()
        } else {
            name.to_string()
        };
        self.peers.insert(
            peer,
            PeerStat {
                name,
                team,
                kills: 0,
                deaths: 0,
            },
        );
    }

    fn remove_peer(&mut self, peer: PeerId) {
        self.peers.remove(&peer);
    }

    fn rename_peer(&mut self, peer: PeerId, name: &str) {
        if let Some(stat) = self.peers.get_mut(&peer) {
            stat.name = name.to_string();
        }
    }

    fn set_kills(&mut self, peer: PeerId, kills: i16) {
        self.entry(peer).kills = kills;
    }

    fn set_deaths(&mut self, peer: PeerId, deaths: i16) {
        self.entry(peer).deaths = deaths;
    }

    fn record_kill(&mut self, killer: PeerId, victim: PeerId) {
        if let Some(stat) = self.peers.get_mut(&killer) {
            stat.kills = stat.kills.saturating_add(1);
        }
        if let Some(stat) = self.peers.get_mut(&victim) {
            stat.deaths = stat.deaths.saturating_add(1);
        }
    }

    fn record_round_loss(&mut self, team: Team) {
        if team == 0 {
            self.team_score.second = self.team_score.second.saturating_add(1);
        } else {
            self.team_score.first = self.team_score.first.saturating_add(1);
        }
    }

    fn kills(&self, peer: PeerId) -> Option<i16> {
        self.peers.get(&peer).map(|s| s.kills)
    }

    fn deaths(&self, peer: PeerId) -> Option<i16> {
        self.peers.get(&peer).map(|s| s.deaths)
    }

    fn team_score(&self) -> TeamScore {
        self.team_score
    }

    fn set_team_score(&mut self, score: TeamScore) {
        self.team_score = score;
    }

    fn snapshot(&self) -> Vec<PeerStatRecord> {
        self.peers
            .iter()
            .map(|(peer, s)| PeerStatRecord {
                peer: *peer,
                name: s.name.clone(),
                team: s.team,
                kills: s.kills,
                deaths: s.deaths,
            })
            .collect()
    }

    fn load_snapshot(&mut self, records: Vec<PeerStatRecord>) {
        self.peers = records
            .into_iter()
            .map(|r| {
                (
                    r.peer,
                    PeerStat {
                        name: r.name,
                        team: r.team,
                        kills: r.kills,
                        deaths: r.deaths,
                    },
                )
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer(n: u8) -> PeerId {
        PeerId::new(Ipv4Addr::new(10, 0, 0, n), 5000)
    }

    #[test]
    fn empty_name_falls_back_to_address() {
        let mut stats = NetStats::new();
        stats.add_peer(peer(1), "", 0);
        stats.add_peer(peer(2), "rook", 1);

        assert_eq!(stats.get(peer(1)).unwrap().name, "10.0.0.1");
        assert_eq!(stats.get(peer(2)).unwrap().name, "rook");
    }

    #[test]
    fn kill_updates_both_sides() {
        let mut stats = NetStats::new();
        stats.add_peer(peer(1), "a", 0);
        stats.add_peer(peer(2), "b", 1);

        stats.record_kill(peer(1), peer(2));
        stats.record_kill(peer(1), peer(9));

        assert_eq!(stats.kills(peer(1)), Some(2));
        assert_eq!(stats.deaths(peer(2)), Some(1));
        assert_eq!(stats.kills(peer(9)), None);
    }

    #[test]
    fn losing_team_scores_for_the_other() {
        let mut stats = NetStats::new();
        stats.record_round_loss(0);
        stats.record_round_loss(0);
        stats.record_round_loss(1);

        assert_eq!(stats.team_score(), TeamScore { first: 1, second: 2 });
    }

    #[test]
    fn set_on_unknown_peer_creates_entry() {
        let mut stats = NetStats::new();
        stats.set_kills(peer(3), 7);
        assert_eq!(stats.kills(peer(3)), Some(7));
        assert_eq!(stats.deaths(peer(3)), Some(0));
    }

    #[test]
    fn standings_order_by_kills() {
        let mut stats = NetStats::new();
        stats.add_peer(peer(1), "a", 0);
        stats.add_peer(peer(2), "b", 0);
        stats.set_kills(peer(2), 5);

        let order: Vec<PeerId> = stats.standings().into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![peer(2), peer(1)]);
    }

    #[test]
    fn snapshot_replaces_table() {
        let mut host = NetStats::new();
        host.add_peer(peer(1), "a", 0);
        host.set_deaths(peer(1), 4);

        let mut client = NetStats::new();
        client.add_peer(peer(7), "stale", 0);
        client.load_snapshot(host.snapshot());

        assert_eq!(client.snapshot(), host.snapshot());
        assert_eq!(client.kills(peer(7)), None);
    }
}
