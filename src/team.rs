use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::{PortalError, PortalResult};
use crate::gateway::{GatewayResult, PortalClient};
use crate::models::{Student, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterState {
    Assembling,
    Full,
    Confirmed,
}

/// A team being put together by a student, capped at `capacity` members.
///
/// Confirmation needs exactly `capacity` members and cannot be undone.
#[derive(Debug, Clone)]
pub struct Roster {
    pub name: String,
    capacity: usize,
    members: Vec<Student>,
    confirmed: bool,
}

impl Roster {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            members: Vec::with_capacity(capacity),
            confirmed: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn members(&self) -> &[Student] {
        &self.members
    }

    pub fn state(&self) -> RosterState {
        if self.confirmed {
            RosterState::Confirmed
        } else if self.members.len() >= self.capacity {
            RosterState::Full
        } else {
            RosterState::Assembling
        }
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.members.iter().any(|m| m.id == student_id)
    }

    pub fn add(&mut self, student: Student) -> PortalResult {
        match self.state() {
            RosterState::Confirmed => return Err(PortalError::RosterConfirmed),
            RosterState::Full => {
                warn!("Roster {} is full, rejected {}", self.name, student.id);
                return Err(PortalError::RosterFull(self.capacity));
            }
            RosterState::Assembling => {}
        }
        if self.contains(&student.id) {
            return Err(PortalError::AlreadyOnRoster(student.name));
        }
        self.members.push(student);
        Ok(())
    }

    /// Drop a member. Returns whether anyone was removed.
    pub fn remove(&mut self, student_id: &str) -> PortalResult<bool> {
        if self.confirmed {
            return Err(PortalError::RosterConfirmed);
        }
        let before = self.members.len();
        self.members.retain(|m| m.id != student_id);
        Ok(self.members.len() != before)
    }

    pub fn confirm(&mut self) -> PortalResult {
        if self.confirmed {
            return Err(PortalError::RosterConfirmed);
        }
        if self.members.len() != self.capacity {
            return Err(PortalError::RosterSize {
                expected: self.capacity,
                actual: self.members.len(),
            });
        }
        self.confirmed = true;
        info!("Roster {} confirmed with {} members", self.name, self.members.len());
        Ok(())
    }

    /// Students from `pool` not on the roster whose name or email contains
    /// `query`, ignoring case.
    pub fn candidates<'a>(&self, pool: &'a [Student], query: &str) -> Vec<&'a Student> {
        let query = query.trim().to_lowercase();
        pool.iter()
            .filter(|s| !self.contains(&s.id))
            .filter(|s| {
                query.is_empty()
                    || s.name.to_lowercase().contains(&query)
                    || s.email.to_lowercase().contains(&query)
            })
            .collect()
    }
}

/// Registered teams as the administrator reviews them, with the leader
/// picked for each team before approval.
#[derive(Debug, Default)]
pub struct TeamBoard {
    teams: Vec<Team>,
    leaders: HashMap<String, String>,
}

impl TeamBoard {
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn leader(&self, team_id: &str) -> Option<&str> {
        self.leaders.get(team_id).map(String::as_str)
    }

    /// Pick the leader for a team; the leader has to be one of its members.
    pub fn select_leader(&mut self, team_id: &str, member_id: &str) -> PortalResult {
        let team = self
            .teams
            .iter()
            .find(|t| t.id == team_id)
            .ok_or(PortalError::StepUnavailable("unknown team"))?;
        if !team.members.iter().any(|m| m.id == member_id) {
            return Err(PortalError::StepUnavailable("the leader must be a member of the team"));
        }
        self.leaders.insert(team_id.to_string(), member_id.to_string());
        Ok(())
    }

    pub async fn refresh(&mut self, client: &PortalClient) -> GatewayResult<()> {
        self.teams = client.list_teams().await?;
        Ok(())
    }

    /// Approve with the selected leader and reload the list. Without a
    /// leader nothing is sent and the list is left alone.
    pub async fn approve(&mut self, client: &PortalClient, team_id: &str) -> GatewayResult<()> {
        client.approve_team(team_id, self.leader(team_id)).await?;
        self.refresh(client).await
    }

    pub async fn reject(&mut self, client: &PortalClient, team_id: &str) -> GatewayResult<()> {
        client.reject_team(team_id).await?;
        self.refresh(client).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::gateway::tests::{spawn_backend, Backend};
    use crate::models::TeamStatus;

    fn student(n: usize) -> Student {
        Student {
            id: format!("w{n:03}"),
            name: format!("Student {n}"),
            email: format!("student{n}@westminster.ac.uk"),
            group: Some("CS-G1".into()),
        }
    }

    fn full_roster() -> Roster {
        let mut roster = Roster::new("Team Alpha", 6);
        for n in 0..6 {
            roster.add(student(n)).unwrap();
        }
        roster
    }

    #[test]
    fn test_confirm_only_with_exact_size() {
        for size in 0..6 {
            let mut roster = Roster::new("T", 6);
            for n in 0..size {
                roster.add(student(n)).unwrap();
            }
            assert_eq!(
                roster.confirm(),
                Err(PortalError::RosterSize {
                    expected: 6,
                    actual: size
                })
            );
            assert_eq!(roster.state(), RosterState::Assembling);
        }

        let mut roster = full_roster();
        assert_eq!(roster.state(), RosterState::Full);
        roster.confirm().unwrap();
        assert_eq!(roster.state(), RosterState::Confirmed);
    }

    #[test]
    fn test_confirmed_is_terminal() {
        let mut roster = full_roster();
        roster.confirm().unwrap();

        assert_eq!(roster.add(student(9)), Err(PortalError::RosterConfirmed));
        assert_eq!(roster.remove("w000"), Err(PortalError::RosterConfirmed));
        assert_eq!(roster.confirm(), Err(PortalError::RosterConfirmed));
        assert_eq!(roster.members().len(), 6);
    }

    #[test]
    fn test_add_when_full() {
        let mut roster = full_roster();
        assert_eq!(roster.add(student(6)), Err(PortalError::RosterFull(6)));
        assert_eq!(roster.members().len(), 6);

        assert_eq!(roster.remove("w002"), Ok(true));
        assert_eq!(roster.state(), RosterState::Assembling);
        roster.add(student(6)).unwrap();
    }

    #[test]
    fn test_membership_unique() {
        let mut roster = Roster::new("T", 6);
        roster.add(student(1)).unwrap();
        assert_eq!(
            roster.add(student(1)),
            Err(PortalError::AlreadyOnRoster("Student 1".into()))
        );
        assert_eq!(roster.remove("nobody"), Ok(false));
    }

    #[test]
    fn test_candidates_exclude_members_and_ignore_case() {
        let pool: Vec<Student> = (0..12).map(student).collect();
        let mut roster = Roster::new("T", 6);
        roster.add(pool[1].clone()).unwrap();

        let hits = roster.candidates(&pool, "STUDENT1");
        let ids: Vec<&str> = hits.iter().map(|s| s.id.as_str()).collect();
        // Email match for student10/11; student1 is already on the roster.
        assert_eq!(ids, ["w010", "w011"]);

        assert_eq!(roster.candidates(&pool, "").len(), 11);
        assert_eq!(roster.candidates(&pool, "student 3").len(), 1);
    }

    #[tokio::test]
    async fn test_board_approve_requires_leader() {
        let backend = Backend::default();
        let client = PortalClient::new(&spawn_backend(backend.clone()).await).unwrap();
        let mut board = TeamBoard::default();
        board.refresh(&client).await.unwrap();
        let calls = backend.calls.load(Ordering::SeqCst);
        let before = board.teams().to_vec();

        assert!(board.approve(&client, "1").await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
        assert_eq!(board.teams(), before.as_slice());

        assert!(board.select_leader("1", "99").is_err());
        board.select_leader("1", "11").unwrap();
        board.approve(&client, "1").await.unwrap();
        assert_eq!(board.teams()[0].status, TeamStatus::Approved);
    }
}
