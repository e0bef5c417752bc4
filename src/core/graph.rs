//! Resource graph: write-once descriptors keyed by logical id.
//!
//! Resources can only reference ids that were declared before them, so the
//! declaration order is always a valid dependency order.

use crate::domain::model::{
    ListenerSpec, OutputSpec, OutputValue, Resource, ResourceId, ResourceKind, ServiceSpec,
    TargetGroupSpec, TaskSpec,
};
use crate::utils::error::{Result, StackError};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGraph {
    stack_name: String,
    region: String,
    description: String,
    resources: BTreeMap<ResourceId, Resource>,
    order: Vec<ResourceId>,
    outputs: BTreeMap<ResourceId, OutputSpec>,
    /// Every template logical id in use: resources, outputs and the ids
    /// resources expand into when rendered.
    logical_ids: BTreeSet<String>,
}

impl ResourceGraph {
    pub fn new(
        stack_name: impl Into<String>,
        region: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            description: description.into(),
            resources: BTreeMap::new(),
            order: Vec::new(),
            outputs: BTreeMap::new(),
            logical_ids: BTreeSet::new(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add a resource. Fails on a duplicate id (including the ids it expands
    /// into) or on a reference to anything not declared yet (or declared with
    /// another kind).
    pub fn declare(&mut self, resource: Resource) -> Result<()> {
        let id = resource.id().clone();
        let mut claimed = BTreeSet::new();
        for logical_id in std::iter::once(id.to_string()).chain(resource.derived_ids()) {
            if self.logical_ids.contains(&logical_id) || !claimed.insert(logical_id.clone()) {
                return Err(StackError::Conflict { id: logical_id });
            }
        }
        self.ensure_references(id.as_str(), &resource.references())?;

        debug!("Declared {} '{}'", resource.kind(), id);
        self.logical_ids.extend(claimed);
        self.order.push(id.clone());
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn declare_output(&mut self, output: OutputSpec) -> Result<()> {
        if self.logical_ids.contains(output.id.as_str()) {
            return Err(StackError::Conflict {
                id: output.id.to_string(),
            });
        }
        self.ensure_references(output.id.as_str(), &output.references())?;

        debug!("Declared output '{}'", output.id);
        self.logical_ids.insert(output.id.to_string());
        self.outputs.insert(output.id.clone(), output);
        Ok(())
    }

    fn ensure_references(&self, from: &str, refs: &[(&ResourceId, ResourceKind)]) -> Result<()> {
        for (target, kind) in refs {
            match self.resources.get(*target) {
                Some(existing) if existing.kind() == *kind => {}
                Some(existing) => {
                    return Err(StackError::reference(
                        from,
                        &format!("{} (a {}, expected a {})", target, existing.kind(), kind),
                    ))
                }
                None => return Err(StackError::reference(from, target.as_str())),
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Resources in declaration (dependency) order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().filter_map(|id| self.resources.get(id))
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources().filter(move |r| r.kind() == kind)
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputSpec> {
        self.outputs.values()
    }

    pub fn output(&self, id: &str) -> Option<&OutputSpec> {
        self.outputs.values().find(|o| o.id.as_str() == id)
    }

    pub fn task_definition(&self, id: &ResourceId) -> Option<&TaskSpec> {
        match self.resources.get(id) {
            Some(Resource::TaskDefinition(task)) => Some(task),
            _ => None,
        }
    }

    pub fn service(&self, id: &ResourceId) -> Option<&ServiceSpec> {
        match self.resources.get(id) {
            Some(Resource::Service(svc)) => Some(svc),
            _ => None,
        }
    }

    pub fn target_groups_for<'a>(
        &'a self,
        service: &'a ResourceId,
    ) -> impl Iterator<Item = &'a TargetGroupSpec> + 'a {
        self.resources().filter_map(move |r| match r {
            Resource::TargetGroup(tg) if &tg.service == service => Some(tg),
            _ => None,
        })
    }

    pub fn listeners_for<'a>(
        &'a self,
        target_group: &'a ResourceId,
    ) -> impl Iterator<Item = &'a ListenerSpec> + 'a {
        self.resources().filter_map(move |r| match r {
            Resource::Listener(l) if &l.target_group == target_group => Some(l),
            _ => None,
        })
    }

    /// Ids that `id` points at directly.
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        let mut deps: Vec<&ResourceId> = self
            .resources
            .get(id)
            .map(|r| r.references().into_iter().map(|(dep, _)| dep).collect())
            .unwrap_or_default();
        deps.sort();
        deps.dedup();
        deps
    }

    /// Resolve an output to the concrete value it would take once deployed.
    /// The load balancer DNS name is predicted from the stack name, the load
    /// balancer id and the region.
    pub fn preview_output(&self, id: &str) -> Option<String> {
        let output = self.output(id)?;
        match &output.value {
            OutputValue::LoadBalancerUrl { load_balancer } => Some(format!(
                "http://{}",
                load_balancer_dns_name(&self.stack_name, load_balancer, &self.region)
            )),
        }
    }
}

/// `<name>-<10 digits>.<region>.elb.amazonaws.com`, with `<name>` kept under
/// the 32 character load balancer name limit.
pub fn load_balancer_dns_name(stack_name: &str, load_balancer: &ResourceId, region: &str) -> String {
    let short = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(5)
            .collect()
    };

    let mut hasher = Sha256::new();
    hasher.update(stack_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(load_balancer.as_str().as_bytes());
    let digest = hasher.finalize();

    let suffix = hex::encode_upper(&digest[..6]);
    let mut number_bytes = [0u8; 8];
    number_bytes.copy_from_slice(&digest[8..16]);
    let number = u64::from_be_bytes(number_bytes) % 10_000_000_000;

    let name = [short(stack_name), short(load_balancer.as_str()), suffix]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    format!("{}-{:010}.{}.elb.amazonaws.com", name, number, region)
}
