//! Share Link Service: W3C TAG Capability URL pattern — the unguessable
//! token IS the credential, not a reference resolved against an ACL.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use nexus_core::{Entity, Error, OperationContext, Result};

/// The access level a share link grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    /// Read-only.
    Viewer,
    /// Read and write.
    Editor,
    /// Read, write, and re-share.
    Owner,
}

/// One access attempt against a share link, successful or not.
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    /// Unix millis of the attempt.
    pub timestamp: i64,
    /// Identity that attempted access, if known.
    pub actor: Option<Entity>,
    /// Caller-supplied address, for audit display.
    pub ip_address: Option<String>,
    /// Caller-supplied user agent, for audit display.
    pub user_agent: Option<String>,
    /// What happened.
    pub outcome: AccessOutcome,
}

/// The result of one access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Access granted.
    Granted,
    /// The link has been revoked.
    Revoked,
    /// The link's `expires_at` has passed.
    Expired,
    /// `max_access_count` has been reached.
    LimitReached,
    /// The link requires a password and none/the wrong one was supplied.
    PasswordRejected,
}

/// A share link's persistent state.
#[derive(Debug, Clone)]
pub struct ShareLink {
    /// The unguessable token, also used as the map key.
    pub link_id: Uuid,
    /// The resource the link grants access to.
    pub resource: Entity,
    /// Zone the resource belongs to.
    pub zone_id: String,
    /// What the link grants.
    pub permission_level: PermissionLevel,
    /// Who created the link.
    pub created_by: Entity,
    /// Unix millis of creation.
    pub created_at: i64,
    /// Unix millis after which the link stops granting access, if any.
    pub expires_at: Option<i64>,
    /// Maximum number of successful accesses, if any.
    pub max_access_count: Option<u64>,
    /// Successful accesses so far.
    pub access_count: u64,
    /// `salt:sha256(salt:password)`, when the link is password-protected.
    password_hash: Option<String>,
    /// Set once the link is revoked; revocation is permanent.
    pub revoked_at: Option<i64>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{salt}:{password}").as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest {
        hex.push_str(&format!("{b:02x}"));
    }
    hex
}

fn gen_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(32);
    for b in bytes {
        hex.push_str(&format!("{b:02x}"));
    }
    hex
}

/// Constant-time byte comparison, so password verification does not leak
/// timing information proportional to how many leading bytes match.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Manages the lifecycle of capability-URL share links for one deployment.
#[derive(Default)]
pub struct ShareLinkService {
    links: DashMap<Uuid, Mutex<ShareLink>>,
    logs: DashMap<Uuid, Mutex<Vec<AccessLogEntry>>>,
    next_seq: AtomicU64,
}

impl ShareLinkService {
    /// An empty service.
    pub fn new() -> Self {
        ShareLinkService {
            links: DashMap::new(),
            logs: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// `create`: issue a new share link for `resource`.
    ///
    /// The caller must already hold write permission on `resource` (verified
    /// by the caller via `nexus-authz` before invoking this, or bypassed by
    /// an admin context) — this service only manages link lifecycle, not
    /// the authorization decision that gates issuing one.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        ctx: &OperationContext,
        resource: Entity,
        permission_level: PermissionLevel,
        expires_in_hours: Option<i64>,
        max_access_count: Option<u64>,
        password: Option<&str>,
    ) -> Result<Uuid> {
        let password_hash = password.map(|p| {
            let salt = gen_salt();
            format!("{salt}:{}", hash_password(&salt, p))
        });
        let now = now_ms();
        let link = ShareLink {
            link_id: Uuid::new_v4(),
            resource,
            zone_id: ctx.zone.0.clone(),
            permission_level,
            created_by: ctx.subject.clone(),
            created_at: now,
            expires_at: expires_in_hours.map(|h| now + h * 3_600_000),
            max_access_count,
            access_count: 0,
            password_hash,
            revoked_at: None,
        };
        let link_id = link.link_id;
        self.links.insert(link_id, Mutex::new(link));
        self.logs.insert(link_id, Mutex::new(Vec::new()));
        self.next_seq.fetch_add(1, Ordering::Relaxed);
        Ok(link_id)
    }

    /// `access`: attempt to use a share link, in request order.
    ///
    /// Password verification runs in constant time regardless of whether
    /// the link even requires one, so the presence of a password
    /// requirement cannot be inferred from response latency alone.
    pub fn access(
        &self,
        link_id: Uuid,
        password: Option<&str>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        actor: Option<Entity>,
    ) -> Result<ShareLink> {
        let entry = self.links.get(&link_id).ok_or_else(|| Error::NotFound(format!("share link {link_id}")))?;
        let mut link = entry.lock();
        let now = now_ms();

        let outcome = if link.revoked_at.is_some() {
            Some(AccessOutcome::Revoked)
        } else if link.expires_at.is_some_and(|exp| now > exp) {
            Some(AccessOutcome::Expired)
        } else if link.max_access_count.is_some_and(|max| link.access_count >= max) {
            Some(AccessOutcome::LimitReached)
        } else {
            None
        };

        let outcome = outcome.unwrap_or_else(|| {
            let supplied = password.unwrap_or("");
            let ok = match &link.password_hash {
                None => true,
                Some(combined) => match combined.split_once(':') {
                    Some((salt, expected)) => constant_time_eq(&hash_password(salt, supplied), expected),
                    None => false,
                },
            };
            if ok {
                AccessOutcome::Granted
            } else {
                AccessOutcome::PasswordRejected
            }
        });

        if outcome == AccessOutcome::Granted {
            link.access_count += 1;
        }

        if let Some(log) = self.logs.get(&link_id) {
            log.lock().push(AccessLogEntry {
                timestamp: now,
                actor,
                ip_address,
                user_agent,
                outcome,
            });
        }

        match outcome {
            AccessOutcome::Granted => Ok(link.clone()),
            AccessOutcome::Revoked | AccessOutcome::Expired | AccessOutcome::LimitReached => {
                Err(Error::PermissionDenied(format!("share link {link_id}: {outcome:?}")))
            }
            AccessOutcome::PasswordRejected => Err(Error::PermissionDenied(format!("share link {link_id}: password rejected"))),
        }
    }

    /// `revoke`: mark a link permanently unusable. Caller must be the
    /// link's creator or an admin context — enforced by the caller.
    pub fn revoke(&self, ctx: &OperationContext, link_id: Uuid) -> Result<()> {
        let entry = self.links.get(&link_id).ok_or_else(|| Error::NotFound(format!("share link {link_id}")))?;
        let mut link = entry.lock();
        if !ctx.is_admin && link.created_by != ctx.subject {
            return Err(Error::PermissionDenied(format!("{} is not the owner of share link {link_id}", ctx.subject)));
        }
        link.revoked_at = Some(now_ms());
        Ok(())
    }

    /// `get_access_logs`: the most recent `limit` access attempts, newest
    /// first. Caller must be the link's creator or an admin context.
    pub fn get_access_logs(&self, ctx: &OperationContext, link_id: Uuid, limit: usize) -> Result<Vec<AccessLogEntry>> {
        let entry = self.links.get(&link_id).ok_or_else(|| Error::NotFound(format!("share link {link_id}")))?;
        let owner_ok = {
            let link = entry.lock();
            ctx.is_admin || link.created_by == ctx.subject
        };
        if !owner_ok {
            return Err(Error::PermissionDenied(format!("{} is not the owner of share link {link_id}", ctx.subject)));
        }
        let log = self.logs.get(&link_id).ok_or_else(|| Error::NotFound(format!("share link {link_id}")))?;
        let mut entries = log.lock().clone();
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}
