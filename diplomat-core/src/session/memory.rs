//! In-memory session authority and camera directory.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::worker::CameraId;
use crate::session::{
    CameraDirectory, DirectoryError, Role, SessionAuthority, SessionError, SessionPolicy, UnixTime,
};

/// A class may be joined this many seconds before it starts.
pub const EARLY_ADMISSION_SECS: i64 = 60;

/// An issued viewer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// School that issued the session.
    pub school: String,
    /// Opaque session token.
    pub token: String,
    /// User the session belongs to.
    pub user: String,
    /// When the session was issued.
    pub issued_at: UnixTime,
}

/// A user's role within a school.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// School the user belongs to.
    pub school: String,
    /// User name.
    pub user: String,
    /// Role code.
    pub role: Role,
}

/// A scheduled class: who attends, where, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// School running the class.
    pub school: String,
    /// Room the class is held in.
    pub room: String,
    /// Period start.
    pub starts_at: UnixTime,
    /// Period end.
    pub ends_at: UnixTime,
    /// Users enrolled in the class.
    #[serde(default)]
    pub roster: Vec<String>,
}

impl ClassRecord {
    fn admits(&self, school: &str, user: &str, now: UnixTime) -> bool {
        self.school == school
            && self.starts_at < now + EARLY_ADMISSION_SECS
            && self.ends_at > now
            && self.roster.iter().any(|u| u == user)
    }
}

/// Seed data for an [`InMemoryDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Issued sessions.
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    /// People and their roles.
    #[serde(default)]
    pub people: Vec<PersonRecord>,
    /// Class schedule.
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    /// Room to camera map.
    #[serde(default)]
    pub cameras: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct LiveSession {
    user: String,
    issued_at: UnixTime,
}

/// Sessions, people, schedule and cameras held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    policy: SessionPolicy,
    /// Keyed by (school, token); tokens are only unique within a school.
    sessions: DashMap<(String, String), LiveSession>,
    people: DashMap<(String, String), Role>,
    classes: RwLock<Vec<ClassRecord>>,
    cameras: DashMap<String, CameraId>,
}

impl InMemoryDirectory {
    /// An empty directory with the default session policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session policy.
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build a directory from seed data. Cameras with an empty id are skipped.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self::new().seeded(snapshot)
    }

    /// Add seed data to this directory.
    pub fn seeded(self, snapshot: DirectorySnapshot) -> Self {
        let directory = self;
        for session in snapshot.sessions {
            directory.insert_session(session);
        }
        for person in snapshot.people {
            directory.insert_person(&person.school, &person.user, person.role);
        }
        for class in snapshot.classes {
            directory.insert_class(class);
        }
        for (room, camera) in snapshot.cameras {
            if let Some(camera) = CameraId::new(camera) {
                directory.insert_camera(&room, camera);
            }
        }
        directory
    }

    /// Record an issued session, replacing any with the same school and token.
    pub fn insert_session(&self, record: SessionRecord) {
        self.sessions.insert(
            (record.school, record.token),
            LiveSession {
                user: record.user,
                issued_at: record.issued_at,
            },
        );
    }

    /// Record a user's role.
    pub fn insert_person(&self, school: &str, user: &str, role: Role) {
        self.people.insert((school.to_string(), user.to_string()), role);
    }

    /// Add a class to the schedule.
    pub fn insert_class(&self, class: ClassRecord) {
        let mut classes = self.classes.write();
        classes.push(class);
        classes.sort_by_key(|c| c.starts_at);
    }

    /// Install a camera in a room.
    pub fn insert_camera(&self, room: &str, camera: CameraId) {
        self.cameras.insert(room.to_string(), camera);
    }

    fn room_camera(&self, room: &str) -> Result<CameraId, DirectoryError> {
        self.cameras
            .get(room)
            .map(|c| c.value().clone())
            .ok_or_else(|| DirectoryError::UnknownRoom(room.to_string()))
    }
}

#[async_trait]
impl SessionAuthority for InMemoryDirectory {
    async fn check_session(
        &self,
        school: &str,
        token: &str,
        now: UnixTime,
    ) -> Result<Role, SessionError> {
        let key = (school.to_string(), token.to_string());
        let session = self
            .sessions
            .get(&key)
            .map(|s| s.value().clone())
            .ok_or(SessionError::NotFound)?;

        if let Some(overdue_secs) = self.policy.overdue_secs(session.issued_at, now) {
            self.sessions.remove(&key);
            info!(school, overdue_secs, "purged expired session");
            return Err(SessionError::Expired {
                token: token.to_string(),
                overdue_secs,
            });
        }

        self.people
            .get(&(key.0, session.user.clone()))
            .map(|r| *r.value())
            .ok_or(SessionError::NoRole(session.user))
    }
}

#[async_trait]
impl CameraDirectory for InMemoryDirectory {
    async fn camera_for_session(
        &self,
        school: &str,
        token: &str,
        now: UnixTime,
    ) -> Result<CameraId, DirectoryError> {
        let user = self
            .sessions
            .get(&(school.to_string(), token.to_string()))
            .map(|s| s.user.clone())
            .ok_or(DirectoryError::NoActiveClass)?;

        let room = self
            .classes
            .read()
            .iter()
            .find(|c| c.admits(school, &user, now))
            .map(|c| c.room.clone())
            .ok_or(DirectoryError::NoActiveClass)?;

        self.room_camera(&room)
    }

    async fn camera_for_room(&self, room: &str) -> Result<CameraId, DirectoryError> {
        self.room_camera(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: UnixTime = 1_700_000_000;

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::from_snapshot(DirectorySnapshot {
            sessions: vec![SessionRecord {
                school: "north".into(),
                token: "tok-ana".into(),
                user: "ana".into(),
                issued_at: T0,
            }],
            people: vec![PersonRecord {
                school: "north".into(),
                user: "ana".into(),
                role: Role::Student,
            }],
            classes: vec![ClassRecord {
                school: "north".into(),
                room: "101".into(),
                starts_at: T0 + 600,
                ends_at: T0 + 3600,
                roster: vec!["ana".into()],
            }],
            cameras: vec![("101".into(), "cam-101".into())],
        })
    }

    #[tokio::test]
    async fn accepts_until_the_boundary() {
        let dir = directory();
        assert_eq!(dir.check_session("north", "tok-ana", T0 + 1799).await, Ok(Role::Student));
        assert_eq!(dir.check_session("north", "tok-ana", T0 + 1800).await, Ok(Role::Student));
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let dir = directory();
        let err = dir.check_session("north", "tok-ana", T0 + 1801).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Expired {
                token: "tok-ana".into(),
                overdue_secs: 1
            }
        );
        assert_eq!(
            dir.check_session("north", "tok-ana", T0 + 10).await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test]
    async fn session_must_match_school() {
        let dir = directory();
        assert_eq!(
            dir.check_session("south", "tok-ana", T0).await,
            Err(SessionError::NotFound)
        );
        assert_eq!(dir.check_session("north", "tok-ana", T0).await, Ok(Role::Student));
    }

    #[tokio::test]
    async fn schools_may_issue_the_same_token() {
        let dir = directory();
        dir.insert_session(SessionRecord {
            school: "south".into(),
            token: "tok-ana".into(),
            user: "bo".into(),
            issued_at: T0,
        });
        dir.insert_person("south", "bo", Role::Admin);
        dir.insert_class(ClassRecord {
            school: "south".into(),
            room: "gym".into(),
            starts_at: T0 + 600,
            ends_at: T0 + 3600,
            roster: vec!["ana".into(), "bo".into()],
        });
        dir.insert_camera("gym", CameraId::new("cam-gym").unwrap());

        assert_eq!(dir.check_session("north", "tok-ana", T0).await, Ok(Role::Student));
        assert_eq!(dir.check_session("south", "tok-ana", T0).await, Ok(Role::Admin));
        assert_eq!(
            dir.camera_for_session("north", "tok-ana", T0 + 700).await,
            Ok(CameraId::new("cam-101").unwrap())
        );
        assert_eq!(
            dir.camera_for_session("south", "tok-ana", T0 + 700).await,
            Ok(CameraId::new("cam-gym").unwrap())
        );

        // Expiring one school's session leaves the other alone.
        dir.insert_session(SessionRecord {
            school: "south".into(),
            token: "tok-ana".into(),
            user: "bo".into(),
            issued_at: T0 - 3600,
        });
        assert!(dir.check_session("south", "tok-ana", T0).await.is_err());
        assert_eq!(dir.check_session("north", "tok-ana", T0).await, Ok(Role::Student));
    }

    #[tokio::test]
    async fn policy_sets_the_maximum_age() {
        let dir = InMemoryDirectory::new()
            .with_policy(SessionPolicy {
                max_age: std::time::Duration::from_secs(60),
            })
            .seeded(DirectorySnapshot {
                sessions: vec![SessionRecord {
                    school: "north".into(),
                    token: "t".into(),
                    user: "ana".into(),
                    issued_at: T0,
                }],
                people: vec![PersonRecord {
                    school: "north".into(),
                    user: "ana".into(),
                    role: Role::Teacher,
                }],
                ..Default::default()
            });

        assert_eq!(dir.check_session("north", "t", T0 + 60).await, Ok(Role::Teacher));
        assert!(matches!(
            dir.check_session("north", "t", T0 + 61).await,
            Err(SessionError::Expired { overdue_secs: 1, .. })
        ));
    }

    #[tokio::test]
    async fn missing_role_is_reported() {
        let dir = directory();
        dir.insert_session(SessionRecord {
            school: "north".into(),
            token: "tok-bo".into(),
            user: "bo".into(),
            issued_at: T0,
        });
        assert_eq!(
            dir.check_session("north", "tok-bo", T0).await,
            Err(SessionError::NoRole("bo".into()))
        );
    }

    #[tokio::test]
    async fn class_window_opens_a_minute_early() {
        let dir = directory();
        assert_eq!(
            dir.camera_for_session("north", "tok-ana", T0 + 540).await,
            Err(DirectoryError::NoActiveClass)
        );
        assert_eq!(
            dir.camera_for_session("north", "tok-ana", T0 + 541).await,
            Ok(CameraId::new("cam-101").unwrap())
        );
        assert_eq!(
            dir.camera_for_session("north", "tok-ana", T0 + 3599).await,
            Ok(CameraId::new("cam-101").unwrap())
        );
        assert_eq!(
            dir.camera_for_session("north", "tok-ana", T0 + 3600).await,
            Err(DirectoryError::NoActiveClass)
        );
    }

    #[tokio::test]
    async fn room_lookup() {
        let dir = directory();
        assert_eq!(dir.camera_for_room("101").await, Ok(CameraId::new("cam-101").unwrap()));
        assert_eq!(
            dir.camera_for_room("202").await,
            Err(DirectoryError::UnknownRoom("202".into()))
        );
    }

    #[test]
    fn snapshot_parses_role_codes() {
        let json = r#"{
            "people": [{"school": "north", "user": "root", "role": "A"}],
            "cameras": [["lab", "cam-lab"]]
        }"#;
        let snapshot: DirectorySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.people[0].role, Role::Admin);
        assert!(snapshot.sessions.is_empty());
    }
}
