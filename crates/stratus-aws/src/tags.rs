//! Resource tags across the three AWS XML encodings.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::params::Params;
use crate::service::ServiceDescriptor;
use crate::xml::{ItemSet, MemberList};

const SYSTEM_TAG_PREFIX: &str = "aws:";

/// One key/value pair. EC2 spells the fields lowercase, everyone else PascalCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagPair {
    #[serde(rename = "Key", alias = "key", default)]
    pub key: String,
    #[serde(rename = "Value", alias = "value", default)]
    pub value: String,
}

/// `<TagList><Tag>..</Tag></TagList>` as used by RDS and ElastiCache.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagList {
    #[serde(rename = "Tag", default)]
    pub tag: Vec<TagPair>,
}

/// The wire shape a tag collection arrived in.
#[derive(Debug, Clone)]
pub enum TagShape {
    /// EC2 `tagSet > item`.
    TagSet(ItemSet<TagPair>),
    /// RDS / ElastiCache `TagList > Tag`.
    TagList(TagList),
    /// ELB `Tags > member`.
    Members(MemberList<TagPair>),
}

impl TagShape {
    fn into_pairs(self) -> Vec<TagPair> {
        match self {
            TagShape::TagSet(set) => set.item,
            TagShape::TagList(list) => list.tag,
            TagShape::Members(list) => list.member,
        }
    }
}

/// User tags plus the `aws:*` system tags, kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sys_tags: BTreeMap<String, String>,
}

impl TagSet {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut set = TagSet::default();
        for (k, v) in pairs {
            if k.starts_with(SYSTEM_TAG_PREFIX) {
                set.sys_tags.insert(k, v);
            } else {
                set.tags.insert(k, v);
            }
        }
        set
    }

    /// Case-insensitive lookup among user tags.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get_ignore_case("Name")
    }

    pub fn description(&self) -> Option<&str> {
        self.get_ignore_case("Description")
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.sys_tags.is_empty()
    }

    /// User tag changes needed to go from `self` to `desired`: (upserts, removed keys).
    pub fn diff(
        &self,
        desired: &BTreeMap<String, String>,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let upserts = desired
            .iter()
            .filter(|(k, v)| self.tags.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = self
            .tags
            .keys()
            .filter(|k| !desired.contains_key(*k))
            .cloned()
            .collect();
        (upserts, removed)
    }
}

impl From<TagShape> for TagSet {
    fn from(shape: TagShape) -> Self {
        TagSet::from_pairs(shape.into_pairs().into_iter().map(|p| (p.key, p.value)))
    }
}

impl From<ItemSet<TagPair>> for TagSet {
    fn from(set: ItemSet<TagPair>) -> Self {
        TagShape::TagSet(set).into()
    }
}

impl From<TagList> for TagSet {
    fn from(list: TagList) -> Self {
        TagShape::TagList(list).into()
    }
}

impl From<MemberList<TagPair>> for TagSet {
    fn from(list: MemberList<TagPair>) -> Self {
        TagShape::Members(list).into()
    }
}

/// `deserialize_with` adapter for EC2 `tagSet` elements.
pub fn de_tag_set<'de, D: Deserializer<'de>>(d: D) -> Result<TagSet, D::Error> {
    ItemSet::<TagPair>::deserialize(d).map(TagSet::from)
}

/// `deserialize_with` adapter for RDS / ElastiCache `TagList` elements.
pub fn de_tag_list<'de, D: Deserializer<'de>>(d: D) -> Result<TagSet, D::Error> {
    TagList::deserialize(d).map(TagSet::from)
}

/// `deserialize_with` adapter for ELB `Tags` member lists.
pub fn de_members<'de, D: Deserializer<'de>>(d: D) -> Result<TagSet, D::Error> {
    MemberList::<TagPair>::deserialize(d).map(TagSet::from)
}

#[derive(Debug, Deserialize)]
struct ListTagsForResourceResult {
    #[serde(rename = "TagList", default)]
    tag_list: TagList,
}

/// ARN-addressed tag calls shared by RDS and ElastiCache
/// (`ListTagsForResource`, `AddTagsToResource`, `RemoveTagsFromResource`).
pub struct ArnTagger<'a> {
    dispatcher: &'a Dispatcher,
    svc: &'a ServiceDescriptor,
    region: &'a str,
}

impl<'a> ArnTagger<'a> {
    pub fn new(dispatcher: &'a Dispatcher, svc: &'a ServiceDescriptor, region: &'a str) -> Self {
        Self {
            dispatcher,
            svc,
            region,
        }
    }

    pub async fn list(&self, arn: &str) -> CloudResult<TagSet> {
        let mut params = Params::new();
        params.set("ResourceName", arn);
        let result: ListTagsForResourceResult = self
            .dispatcher
            .query(self.svc, self.region, "ListTagsForResource", &params)
            .await
            .context("ListTagsForResource")?;
        Ok(result.tag_list.into())
    }

    pub async fn add(&self, arn: &str, tags: &BTreeMap<String, String>) -> CloudResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut params = Params::new();
        params.set("ResourceName", arn).tags("Tags.member", tags);
        self.dispatcher
            .query_unit(self.svc, self.region, "AddTagsToResource", &params)
            .await
            .context("AddTagsToResource")
    }

    pub async fn remove<S: AsRef<str>>(&self, arn: &str, keys: &[S]) -> CloudResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut params = Params::new();
        params.set("ResourceName", arn).members("TagKeys.member", keys);
        self.dispatcher
            .query_unit(self.svc, self.region, "RemoveTagsFromResource", &params)
            .await
            .context("RemoveTagsFromResource")
    }

    /// Read the live tags and converge them on `desired`. Changed values are
    /// removed and re-added; with `replace`, absent keys are removed as well.
    pub async fn set(&self, arn: &str, desired: &BTreeMap<String, String>, replace: bool) -> CloudResult<()> {
        let current = self.list(arn).await?;
        let (upserts, absent) = current.diff(desired);
        let mut removed: Vec<String> = upserts
            .keys()
            .filter(|k| current.tags.contains_key(*k))
            .cloned()
            .collect();
        if replace {
            removed.extend(absent);
        }
        self.remove(arn, &removed)
            .await
            .with_context(|| format!("remove tags {:?}", removed))?;
        self.add(arn, &upserts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::decode;

    #[derive(Deserialize)]
    struct Ec2Thing {
        #[serde(rename = "tagSet", default)]
        tags: ItemSet<TagPair>,
    }

    #[derive(Deserialize)]
    struct RdsThing {
        #[serde(rename = "TagList", default)]
        tags: TagList,
    }

    #[derive(Deserialize)]
    struct ElbThing {
        #[serde(rename = "Tags", default)]
        tags: MemberList<TagPair>,
    }

    #[test]
    fn three_shapes_collapse_to_one_map() {
        let ec2: Ec2Thing = decode(
            "<x><tagSet><item><key>Name</key><value>web</value></item><item><key>aws:cloudformation:stack-name</key><value>s</value></item></tagSet></x>",
        )
        .unwrap();
        let rds: RdsThing =
            decode("<x><TagList><Tag><Key>Name</Key><Value>web</Value></Tag></TagList></x>").unwrap();
        let elb: ElbThing =
            decode("<x><Tags><member><Key>Name</Key><Value>web</Value></member></Tags></x>").unwrap();

        let ec2: TagSet = ec2.tags.into();
        let rds: TagSet = rds.tags.into();
        let elb: TagSet = elb.tags.into();
        assert_eq!(ec2.tags, rds.tags);
        assert_eq!(rds, elb);
        assert_eq!(ec2.sys_tags["aws:cloudformation:stack-name"], "s");
    }

    #[test]
    fn name_and_description_ignore_case() {
        let set = TagSet::from_pairs([
            ("name".to_string(), "db".to_string()),
            ("DESCRIPTION".to_string(), "primary".to_string()),
        ]);
        assert_eq!(set.name(), Some("db"));
        assert_eq!(set.description(), Some("primary"));
    }

    #[derive(Deserialize)]
    struct Vpc {
        #[serde(rename = "vpcId")]
        id: String,
        #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
        tags: TagSet,
    }

    #[test]
    fn deserialize_with_adapter() {
        let with: Vpc = decode(
            "<item><vpcId>vpc-1</vpcId><tagSet><item><key>Name</key><value>main</value></item></tagSet></item>",
        )
        .unwrap();
        assert_eq!(with.tags.name(), Some("main"));
        let without: Vpc = decode("<item><vpcId>vpc-2</vpcId></item>").unwrap();
        assert_eq!(without.id, "vpc-2");
        assert!(without.tags.is_empty());
    }

    #[test]
    fn empty_value_tag() {
        let ec2: Ec2Thing = decode("<x><tagSet><item><key>flag</key><value/></item></tagSet></x>").unwrap();
        let set: TagSet = ec2.tags.into();
        assert_eq!(set.tags["flag"], "");
    }

    #[test]
    fn diff_upserts_and_removals() {
        let current = TagSet::from_pairs([
            ("keep".to_string(), "1".to_string()),
            ("change".to_string(), "old".to_string()),
            ("drop".to_string(), "x".to_string()),
            ("aws:sys".to_string(), "y".to_string()),
        ]);
        let desired: BTreeMap<String, String> = [("keep", "1"), ("change", "new"), ("add", "a")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let (upserts, removed) = current.diff(&desired);
        assert_eq!(upserts.len(), 2);
        assert_eq!(upserts["change"], "new");
        assert_eq!(upserts["add"], "a");
        assert_eq!(removed, ["drop"]);
    }
}
