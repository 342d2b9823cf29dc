use crate::repo::Repo;
use crate::types::{EvolveError, NodeId, Result, Rev};

impl Repo {
    /// Resolves a revision expression to a changeset.
    ///
    /// Accepted forms, tried in order: `.` (working parent), `tip`, a local
    /// revision number, a bookmark name, and a unique hex prefix of a node id.
    pub fn resolve_rev(&self, expr: &str) -> Result<NodeId> {
        let expr = expr.trim();
        match expr {
            "" => return Err(EvolveError::UnknownRevision(expr.to_string())),
            "." => {
                return self
                    .working_parent()
                    .ok_or_else(|| EvolveError::UnknownRevision(expr.to_string()))
            }
            "tip" => {
                return self
                    .graph()
                    .tip()
                    .map(|cs| cs.id)
                    .ok_or_else(|| EvolveError::UnknownRevision(expr.to_string()))
            }
            _ => {}
        }
        if let Ok(number) = expr.parse::<u32>() {
            if let Some(cs) = self.graph().by_rev(Rev(number)) {
                return Ok(cs.id);
            }
        }
        if let Some(node) = self.bookmarks().get(expr) {
            return Ok(node);
        }
        self.resolve_prefix(expr)
    }

    /// Resolves several expressions, keeping their order and dropping duplicates.
    pub fn resolve_revs<S: AsRef<str>>(&self, exprs: &[S]) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let node = self.resolve_rev(expr.as_ref())?;
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<NodeId> {
        let lowered = prefix.to_ascii_lowercase();
        if lowered.is_empty() || !lowered.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EvolveError::UnknownRevision(prefix.to_string()));
        }
        let mut matches = self
            .graph()
            .iter()
            .filter(|cs| cs.id.to_hex().starts_with(&lowered))
            .map(|cs| cs.id);
        match (matches.next(), matches.next()) {
            (Some(node), None) => Ok(node),
            (Some(_), Some(_)) => Err(EvolveError::InvalidArgument(format!(
                "ambiguous identifier '{prefix}'"
            ))),
            (None, _) => Err(EvolveError::UnknownRevision(prefix.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::repo::{CommitRequest, Repo, RepoOptions};
    use crate::types::EvolveError;

    #[test]
    fn resolves_every_form() {
        let mut repo = Repo::in_memory(RepoOptions::default());
        let a = repo.commit(CommitRequest::new("a").write("a", "1")).unwrap();
        let b = repo.commit(CommitRequest::new("b").write("b", "2")).unwrap();
        repo.set_bookmark("feature", a).unwrap();
        assert_eq!(repo.resolve_rev(".").unwrap(), b);
        assert_eq!(repo.resolve_rev("tip").unwrap(), b);
        assert_eq!(repo.resolve_rev("0").unwrap(), a);
        assert_eq!(repo.resolve_rev("feature").unwrap(), a);
        assert_eq!(repo.resolve_rev(&b.to_hex()[..10]).unwrap(), b);
        assert!(matches!(
            repo.resolve_rev("nope"),
            Err(EvolveError::UnknownRevision(_))
        ));
        assert_eq!(repo.resolve_revs(&["1", "tip", "0"]).unwrap(), vec![b, a]);
    }
}
