//! Dependency orderer: turns a [`ChangeSet`] into a [`Plan`].
//!
//! Operations are laid out in three phases. Creates come first (OIDC
//! groups, projects parents-first, teams, then the ACL switch). Updates
//! follow (projects, then per team: removals, additions, grant). Deletes
//! come last (team grants and links, teams, projects children-first, OIDC
//! groups). Each operation also carries explicit edges to the earlier
//! operations it needs, which is what the executor schedules on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::diff::{ChangeSet, ProjectChange, ProjectCreate};
use crate::error::{ReconcileError, ReconcileResult};
use crate::graph;
use crate::plan::{Operation, Plan, PlannedOp};

#[derive(Default)]
struct PlanBuilder {
    ops: Vec<PlannedOp>,
    created_groups: HashMap<String, usize>,
    created_projects: HashMap<String, usize>,
    created_teams: HashMap<String, usize>,
    updated_projects: HashMap<String, usize>,
    /// Project updates keyed by the parent they move away from.
    moved_from: HashMap<String, Vec<usize>>,
    /// Grant removals keyed by project.
    revokes: HashMap<String, Vec<usize>>,
    /// Group unmappings keyed by group.
    unlinks: HashMap<String, Vec<usize>>,
    enable_acl: Option<usize>,
}

impl PlanBuilder {
    fn push(&mut self, operation: Operation, deps: impl IntoIterator<Item = Option<usize>>) -> usize {
        let index = self.ops.len();
        let depends_on: BTreeSet<usize> = deps.into_iter().flatten().collect();
        self.ops.push(PlannedOp {
            index,
            operation,
            depends_on: depends_on.into_iter().collect(),
        });
        index
    }

    fn push_unlink(&mut self, team: &str, group: &str, deps: Vec<Option<usize>>) -> usize {
        let index = self.push(
            Operation::UnlinkOidcGroup {
                team: team.to_string(),
                group: group.to_string(),
            },
            deps,
        );
        self.unlinks.entry(group.to_string()).or_default().push(index);
        index
    }

    fn push_revoke(&mut self, operation: Operation, projects: &BTreeSet<String>, deps: Vec<Option<usize>>) -> usize {
        let index = self.push(operation, deps);
        for project in projects {
            self.revokes.entry(project.clone()).or_default().push(index);
        }
        index
    }
}

/// Orders a change set into an executable plan.
pub struct Orderer;

impl Orderer {
    /// Build the plan. Fails only if the project forest has a cycle.
    pub fn order(changes: &ChangeSet) -> ReconcileResult<Plan> {
        let mut b = PlanBuilder::default();

        // ── Creates ───────────────────────────────────────────────────

        for name in &changes.groups_to_create {
            let index = b.push(Operation::CreateOidcGroup { name: name.clone() }, []);
            b.created_groups.insert(name.clone(), index);
        }

        for create in sort_by_forest(&changes.projects_to_create, &changes.project_order, |c| &c.name) {
            let ProjectCreate {
                name,
                version,
                classifier,
                parent,
            } = create.clone();
            let parent_dep = parent.as_ref().and_then(|p| b.created_projects.get(p).copied());
            let index = b.push(
                Operation::CreateProject {
                    name: name.clone(),
                    version,
                    classifier,
                    parent,
                },
                [parent_dep],
            );
            b.created_projects.insert(name, index);
        }

        for name in &changes.teams_to_create {
            let index = b.push(Operation::CreateTeam { name: name.clone() }, []);
            b.created_teams.insert(name.clone(), index);
        }

        if changes.enable_acl {
            b.enable_acl = Some(b.push(Operation::EnablePortfolioAccessControl, []));
        }

        // ── Updates ───────────────────────────────────────────────────

        for update in sort_by_forest(&changes.projects_to_update, &changes.project_order, |u| &u.name) {
            let ProjectChange {
                name,
                classifier,
                parent,
                previous_parent,
                changes: field_changes,
            } = update.clone();
            let mut deps = vec![parent.as_ref().and_then(|p| b.created_projects.get(p).copied())];
            // A project cannot move under its own descendant, so every move
            // along the new parent's final ancestry has to land first.
            if let Some(parent) = &parent {
                for ancestor in ancestry(parent, &changes.project_parents) {
                    deps.push(b.updated_projects.get(ancestor).copied());
                }
            }
            let index = b.push(
                Operation::UpdateProject {
                    name: name.clone(),
                    classifier,
                    parent,
                    changes: field_changes,
                },
                deps,
            );
            b.updated_projects.insert(name, index);
            if let Some(previous) = previous_parent {
                b.moved_from.entry(previous).or_default().push(index);
            }
        }

        let mut team_updates: Vec<_> = changes.teams_to_update.iter().collect();
        team_updates.sort_by(|a, c| a.name.cmp(&c.name));

        for change in team_updates {
            let team = &change.name;
            let team_dep = b.created_teams.get(team).copied();
            let mut removals: Vec<Option<usize>> = Vec::new();

            for permission in &change.remove_permissions {
                removals.push(Some(b.push(
                    Operation::RemovePermission {
                        team: team.clone(),
                        permission: *permission,
                    },
                    [team_dep],
                )));
            }
            for group in &change.unlink {
                removals.push(Some(b.push_unlink(team, group, vec![team_dep])));
            }

            for permission in &change.add_permissions {
                let mut deps = removals.clone();
                deps.push(team_dep);
                b.push(
                    Operation::AddPermission {
                        team: team.clone(),
                        permission: *permission,
                    },
                    deps,
                );
            }
            for group in &change.link {
                let mut deps = removals.clone();
                deps.push(team_dep);
                deps.push(b.created_groups.get(group).copied());
                b.push(
                    Operation::LinkOidcGroup {
                        team: team.clone(),
                        group: group.clone(),
                    },
                    deps,
                );
            }

            if let Some(grant) = &change.grant {
                let mut deps = removals.clone();
                deps.push(team_dep);
                if !grant.grant.is_empty() {
                    deps.push(b.enable_acl);
                }
                for project in &grant.grant {
                    deps.push(b.created_projects.get(project).copied());
                }
                if grant.verify {
                    // Verification reads the hierarchy as it ends up.
                    for project in &grant.expected {
                        deps.push(b.updated_projects.get(project).copied());
                    }
                }
                b.push_revoke(
                    Operation::ReplaceAccessGrant {
                        team: team.clone(),
                        grant: grant.grant.iter().cloned().collect(),
                        revoke: grant.revoke.iter().cloned().collect(),
                        expected: grant.expected.iter().cloned().collect(),
                        verify: grant.verify,
                    },
                    &grant.revoke,
                    deps,
                );
            }
        }

        // ── Deletes ───────────────────────────────────────────────────

        let mut team_deletes: Vec<_> = changes.teams_to_delete.iter().collect();
        team_deletes.sort_by(|a, c| a.name.cmp(&c.name));

        for delete in team_deletes {
            let mut teardown: Vec<Option<usize>> = Vec::new();
            if !delete.revoke.is_empty() {
                teardown.push(Some(b.push_revoke(
                    Operation::RevokeAccessGrant {
                        team: delete.name.clone(),
                        projects: delete.revoke.iter().cloned().collect(),
                    },
                    &delete.revoke,
                    vec![],
                )));
            }
            for group in &delete.unlink {
                teardown.push(Some(b.push_unlink(&delete.name, group, vec![])));
            }
            b.push(
                Operation::DeleteTeam {
                    name: delete.name.clone(),
                },
                teardown,
            );
        }

        let mut group_deletes: Vec<_> = changes.groups_to_delete.iter().collect();
        group_deletes.sort_by(|a, c| a.name.cmp(&c.name));

        for delete in &group_deletes {
            for team in &delete.unlink_from {
                b.push_unlink(team, &delete.name, vec![]);
            }
        }

        let deleted: BTreeMap<String, Option<String>> = changes
            .projects_to_delete
            .iter()
            .map(|p| (p.name.clone(), p.parent.clone()))
            .collect();
        let delete_order =
            graph::children_first(&deleted).map_err(|cycle| ReconcileError::CyclicParent { cycle })?;
        let mut deleted_projects: HashMap<String, usize> = HashMap::new();

        for name in delete_order {
            let mut deps: Vec<Option<usize>> = deleted
                .iter()
                .filter(|(_, parent)| parent.as_deref() == Some(name.as_str()))
                .map(|(child, _)| deleted_projects.get(child).copied())
                .collect();
            deps.extend(b.moved_from.get(&name).into_iter().flatten().map(|i| Some(*i)));
            deps.extend(b.revokes.get(&name).into_iter().flatten().map(|i| Some(*i)));
            let index = b.push(Operation::DeleteProject { name: name.clone() }, deps);
            deleted_projects.insert(name, index);
        }

        for delete in group_deletes {
            let deps: Vec<Option<usize>> = b
                .unlinks
                .get(&delete.name)
                .into_iter()
                .flatten()
                .map(|i| Some(*i))
                .collect();
            b.push(
                Operation::DeleteOidcGroup {
                    name: delete.name.clone(),
                },
                deps,
            );
        }

        Ok(Plan::new(b.ops, changes.unchanged.clone()))
    }
}

/// Items in the parents-first order of the forest; anything missing from
/// the order keeps its relative position at the end.
fn sort_by_forest<'c, T>(items: &'c [T], order: &[String], name: impl Fn(&T) -> &String) -> Vec<&'c T> {
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by_key(|item| position.get(name(item).as_str()).copied().unwrap_or(usize::MAX));
    sorted
}

/// `project` followed by its ancestors in `parents`.
fn ancestry<'a>(project: &'a str, parents: &'a BTreeMap<String, Option<String>>) -> Vec<&'a str> {
    let mut chain = vec![project];
    let mut current = project;
    while let Some(Some(parent)) = parents.get(current) {
        if chain.contains(&parent.as_str()) {
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain
}
