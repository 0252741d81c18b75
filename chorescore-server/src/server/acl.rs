use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use chorescore_shared::auth::Role;
use chorescore_shared::jwt::JwtClaims;
use chorescore_shared::path;

/// Gate for `/api/v1/family/{family_id}/...`: the token must belong to that
/// family, and the route must be open to the caller's role.
pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let (Some(family), Some(relative)) = (
        path::family_id_from_path(&path),
        path::family_relative(&path),
    ) else {
        tracing::warn!(path = %path, "ACL: path outside family scope");
        return Err(AppError::forbidden());
    };
    let rest = segmented(relative);

    let decision = ensure_family(claims, &family).and_then(|()| match claims.role {
        Role::Parent => allow_parent(&method, &rest),
        Role::Child => allow_child(&method, &rest, claims),
    });

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            profile_id = %claims.sub,
            role = %claims.role,
            token_family = ?claims.family_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_parent(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["members"] if *method == Method::GET => Ok(()),
        ["chores"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["chores", "board"] if *method == Method::GET => Ok(()),
        ["chores", _] if *method == Method::DELETE => Ok(()),
        ["chores", _, "approve" | "reject"] if *method == Method::POST => Ok(()),
        ["leaderboard"] if *method == Method::GET => Ok(()),
        ["points", _] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["members"] if *method == Method::GET => Ok(()),
        ["chores"] if *method == Method::GET => Ok(()),
        ["chores", "board"] if *method == Method::GET => Ok(()),
        // Whether the child is the assignee is checked against the row.
        ["chores", _, "complete"] if *method == Method::POST => Ok(()),
        ["leaderboard"] if *method == Method::GET => Ok(()),
        ["points", user] if *method == Method::GET => ensure_self(claims, user),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn ensure_family(claims: &JwtClaims, family: &str) -> Result<(), AppError> {
    let expected = claims.family_id.as_ref().ok_or_else(AppError::forbidden)?;
    if expected == family {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

fn ensure_self(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    if claims.sub == path::decode_segment(seg) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, family: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: "kid-1".into(),
            jti: "j".into(),
            exp: 0,
            role,
            family_id: family.map(str::to_string),
        }
    }

    #[test]
    fn parent_routes() {
        let ok = [
            (Method::GET, vec!["members"]),
            (Method::GET, vec!["chores"]),
            (Method::POST, vec!["chores"]),
            (Method::GET, vec!["chores", "board"]),
            (Method::DELETE, vec!["chores", "c1"]),
            (Method::POST, vec!["chores", "c1", "approve"]),
            (Method::POST, vec!["chores", "c1", "reject"]),
            (Method::GET, vec!["leaderboard"]),
            (Method::GET, vec!["points", "anyone"]),
        ];
        for (m, rest) in ok {
            assert!(allow_parent(&m, &rest).is_ok(), "{m} {rest:?}");
        }
        assert!(allow_parent(&Method::POST, &["chores", "c1", "complete"]).is_err());
        assert!(allow_parent(&Method::POST, &["leaderboard"]).is_err());
        assert!(allow_parent(&Method::GET, &[]).is_err());
    }

    #[test]
    fn child_routes() {
        let c = claims(Role::Child, Some("fam"));
        assert!(allow_child(&Method::GET, &["chores"], &c).is_ok());
        assert!(allow_child(&Method::POST, &["chores", "c1", "complete"], &c).is_ok());
        assert!(allow_child(&Method::GET, &["points", "kid-1"], &c).is_ok());
        assert!(allow_child(&Method::GET, &["points", "kid%2D1"], &c).is_ok());
        assert!(allow_child(&Method::GET, &["points", "kid-2"], &c).is_err());
        assert!(allow_child(&Method::POST, &["chores"], &c).is_err());
        assert!(allow_child(&Method::POST, &["chores", "c1", "approve"], &c).is_err());
        assert!(allow_child(&Method::POST, &["chores", "c1", "reject"], &c).is_err());
        assert!(allow_child(&Method::DELETE, &["chores", "c1"], &c).is_err());
    }

    #[test]
    fn family_must_match_token() {
        let c = claims(Role::Parent, Some("fam 1"));
        let family = path::family_id_from_path("/api/v1/family/fam%201/chores");
        assert!(ensure_family(&c, family.as_deref().unwrap_or_default()).is_ok());
        assert!(ensure_family(&c, "other").is_err());
        assert!(ensure_family(&claims(Role::Parent, None), "fam").is_err());
    }
}
