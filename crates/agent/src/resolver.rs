//! Contact resolution
//!
//! Decides whether extracted data refers to one of the owner's contacts, a
//! person mentioned by one of them (a bridge), or nobody. Search order, first
//! hit wins:
//!
//! 1. Normalized-name match (exact, containment, or similarity ≥ direct threshold)
//! 2. Embedding similarity, when an embedding client is configured
//! 3. Case-insensitive substring search over text fields
//! 4. Mentioned connections of the owner's contacts
//! 5. No match, with "did you mean" suggestions
//!
//! Also builds the second-degree network view, linking users through shared
//! phone numbers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use contact_agent_config::ResolverConfig;
use contact_agent_core::{
    BridgeHit, Contact, ContactStore, EmbeddingClient, ExtractedContactData, MentionedConnection,
    UserStore,
};
use contact_agent_text_processing::{NameNormalizer, PhoneNormalizer, Suggestion};

use crate::AgentError;

/// How a direct match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Name,
    Semantic,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// One of the owner's own contacts
    Direct {
        contact: Contact,
        method: MatchMethod,
        score: f32,
    },
    /// Someone mentioned by one of the owner's contacts
    Bridge {
        connection: MentionedConnection,
        via: Contact,
    },
    /// Nothing found; soft hints ranked by name similarity
    NoMatch { suggestions: Vec<Suggestion<Contact>> },
}

impl Resolution {
    pub fn direct_contact(&self) -> Option<&Contact> {
        match self {
            Resolution::Direct { contact, .. } => Some(contact),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Direct { .. } => "direct",
            Resolution::Bridge { .. } => "bridge",
            Resolution::NoMatch { .. } => "no_match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The requesting user
    Root,
    /// A direct contact
    Contact,
    /// A mentioned connection of a direct contact
    Mention,
    /// Another user whose phone matches a contact
    LinkedUser,
    /// A contact of a linked user
    SecondDegree,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub id: Uuid,
    pub label: String,
    pub kind: NodeKind,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEdge {
    pub from: Uuid,
    pub to: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkGraph {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl NetworkGraph {
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    fn add_node(&mut self, seen: &mut HashSet<Uuid>, node: NetworkNode) -> bool {
        if !seen.insert(node.id) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    fn add_edge(&mut self, from: Uuid, to: Uuid) {
        self.edges.push(NetworkEdge { from, to });
    }
}

pub struct ContactResolver {
    contacts: Arc<dyn ContactStore>,
    users: Arc<dyn UserStore>,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
    names: NameNormalizer,
    phones: PhoneNormalizer,
    config: ResolverConfig,
    embed_timeout: Duration,
}

impl ContactResolver {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        users: Arc<dyn UserStore>,
        names: NameNormalizer,
        phones: PhoneNormalizer,
        config: ResolverConfig,
    ) -> Self {
        Self {
            contacts,
            users,
            embeddings: None,
            names,
            phones,
            config,
            embed_timeout: Duration::from_secs(5),
        }
    }

    /// Enable the semantic search step
    pub fn with_embeddings(mut self, client: Arc<dyn EmbeddingClient>, timeout: Duration) -> Self {
        self.embeddings = Some(client);
        self.embed_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve extracted data by its name (or company when nameless)
    pub async fn resolve(
        &self,
        owner_id: Uuid,
        extracted: &ExtractedContactData,
    ) -> Result<Resolution, AgentError> {
        match extracted.search_term() {
            Some(term) => self.resolve_term(owner_id, term).await,
            None => Ok(Resolution::NoMatch {
                suggestions: Vec::new(),
            }),
        }
    }

    pub async fn resolve_term(&self, owner_id: Uuid, term: &str) -> Result<Resolution, AgentError> {
        let term = term.trim();
        let contacts = self.contacts.list_contacts(owner_id).await?;
        if contacts.is_empty() || term.is_empty() {
            return Ok(Resolution::NoMatch {
                suggestions: Vec::new(),
            });
        }

        if let Some(best) = self.names.best_match(
            term,
            contacts.iter().map(|c| (c, c.name.clone())),
            self.config.direct_threshold,
        ) {
            tracing::debug!(owner_id = %owner_id, contact_id = %best.item.id, score = best.score, "Resolved by name");
            return Ok(Resolution::Direct {
                contact: best.item.clone(),
                method: MatchMethod::Name,
                score: best.score,
            });
        }

        if let Some(resolution) = self.semantic_match(owner_id, term).await? {
            return Ok(resolution);
        }

        let hits = self
            .contacts
            .search_text(owner_id, term, self.config.search_limit)
            .await?;
        if let Some(contact) = hits.into_iter().next() {
            let score = self.names.similarity(term, &contact.name);
            tracing::debug!(owner_id = %owner_id, contact_id = %contact.id, "Resolved by text search");
            return Ok(Resolution::Direct {
                contact,
                method: MatchMethod::Text,
                score,
            });
        }

        let bridges = self
            .contacts
            .search_mentions(owner_id, term, self.config.search_limit)
            .await?;
        let best_bridge = bridges.into_iter().fold(None, |best: Option<(f32, BridgeHit)>, hit| {
            let score = self.names.similarity(term, &hit.connection.name);
            match best {
                Some((best_score, _)) if best_score >= score => best,
                _ => Some((score, hit)),
            }
        });
        if let Some((_, hit)) = best_bridge {
            tracing::debug!(
                owner_id = %owner_id,
                connection_id = %hit.connection.id,
                via = %hit.via.id,
                "Resolved through a mentioned connection"
            );
            return Ok(Resolution::Bridge {
                connection: hit.connection,
                via: hit.via,
            });
        }

        let suggestions = self.names.suggestions(
            term,
            contacts.into_iter().map(|c| {
                let name = c.name.clone();
                (c, name)
            }),
            self.config.suggestion_threshold,
            self.config.max_suggestions,
        );
        tracing::debug!(owner_id = %owner_id, suggestions = suggestions.len(), "No match");
        Ok(Resolution::NoMatch { suggestions })
    }

    /// Top embedding hit above the semantic threshold. Embedding trouble
    /// skips the step; store errors do not.
    async fn semantic_match(
        &self,
        owner_id: Uuid,
        term: &str,
    ) -> Result<Option<Resolution>, AgentError> {
        let client = match self.embeddings {
            Some(ref client) => client,
            None => return Ok(None),
        };

        let query = match tokio::time::timeout(self.embed_timeout, client.embed(term)).await {
            Ok(Ok(query)) => query,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Embedding failed, skipping semantic search");
                return Ok(None);
            },
            Err(_) => {
                tracing::warn!("Embedding timed out, skipping semantic search");
                return Ok(None);
            },
        };

        let top = self
            .contacts
            .search_by_embedding(owner_id, &query, 1)
            .await?
            .into_iter()
            .next();

        Ok(top
            .filter(|hit| hit.score > self.config.semantic_threshold)
            .map(|hit| {
                tracing::debug!(owner_id = %owner_id, contact_id = %hit.contact.id, score = hit.score, "Resolved semantically");
                Resolution::Direct {
                    contact: hit.contact,
                    method: MatchMethod::Semantic,
                    score: hit.score,
                }
            }))
    }

    /// Breadth-limited network around `owner_id`.
    ///
    /// Level 0 holds the owner's contacts and their mentions. A contact whose
    /// phone (any variant) belongs to another user links that user; linked
    /// users are expanded while `level + 1 < depth`, each capped at the
    /// configured fan-out.
    pub async fn network(&self, owner_id: Uuid, depth: usize) -> Result<NetworkGraph, AgentError> {
        let mut graph = NetworkGraph::default();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut visited_users: HashSet<Uuid> = HashSet::from([owner_id]);

        let root_label = self
            .users
            .get(owner_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| "me".to_string());
        graph.add_node(
            &mut seen,
            NetworkNode {
                id: owner_id,
                label: root_label,
                kind: NodeKind::Root,
                level: 0,
            },
        );
        if depth == 0 {
            return Ok(graph);
        }

        let mut queue: VecDeque<(Uuid, usize)> = VecDeque::from([(owner_id, 0)]);
        while let Some((user_id, level)) = queue.pop_front() {
            let mut contacts = self.contacts.list_contacts(user_id).await?;
            if level > 0 {
                contacts.truncate(self.config.graph_fan_out);
            }

            for contact in contacts {
                let kind = if level == 0 {
                    NodeKind::Contact
                } else {
                    NodeKind::SecondDegree
                };
                let added = graph.add_node(
                    &mut seen,
                    NetworkNode {
                        id: contact.id,
                        label: contact.summary(),
                        kind,
                        level,
                    },
                );
                if !added {
                    continue;
                }
                graph.add_edge(user_id, contact.id);

                if level == 0 {
                    for mention in self.contacts.list_mentions(contact.id).await? {
                        if graph.add_node(
                            &mut seen,
                            NetworkNode {
                                id: mention.id,
                                label: mention.name.clone(),
                                kind: NodeKind::Mention,
                                level,
                            },
                        ) {
                            graph.add_edge(contact.id, mention.id);
                        }
                    }
                }

                if level + 1 >= depth {
                    continue;
                }
                let variants = match contact.phone {
                    Some(ref phone) => self.phones.variants(phone),
                    None => continue,
                };
                if variants.is_empty() {
                    continue;
                }
                if let Some(linked) = self.users.find_by_phone(&variants).await? {
                    if !visited_users.insert(linked.id) {
                        continue;
                    }
                    graph.add_node(
                        &mut seen,
                        NetworkNode {
                            id: linked.id,
                            label: linked.name.clone(),
                            kind: NodeKind::LinkedUser,
                            level: level + 1,
                        },
                    );
                    graph.add_edge(contact.id, linked.id);
                    queue.push_back((linked.id, level + 1));
                }
            }
        }

        tracing::debug!(
            owner_id = %owner_id,
            depth,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Network built"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEmbedder, StaticEmbedder};
    use contact_agent_core::NewUser;
    use contact_agent_persistence::{InMemoryContactStore, InMemoryUserStore};

    struct Fixture {
        contacts: Arc<InMemoryContactStore>,
        users: Arc<InMemoryUserStore>,
        owner: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                contacts: Arc::new(InMemoryContactStore::new()),
                users: Arc::new(InMemoryUserStore::new()),
                owner: Uuid::new_v4(),
            }
        }

        fn resolver(&self) -> ContactResolver {
            ContactResolver::new(
                self.contacts.clone(),
                self.users.clone(),
                NameNormalizer::default(),
                PhoneNormalizer::default(),
                ResolverConfig::default(),
            )
        }

        async fn add(&self, contact: Contact) -> Contact {
            self.contacts.insert_contact(contact).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_no_contacts_is_no_match_without_suggestions() {
        let fixture = Fixture::new();
        let resolution = fixture
            .resolver()
            .resolve(fixture.owner, &ExtractedContactData::named("Matheus"))
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::NoMatch {
                suggestions: Vec::new()
            }
        );
    }

    #[tokio::test]
    async fn test_phonetic_name_match() {
        let fixture = Fixture::new();
        let mateus = fixture.add(Contact::new(fixture.owner, "Mateus")).await;
        fixture.add(Contact::new(fixture.owner, "Fernanda Costa")).await;

        let resolution = fixture
            .resolver()
            .resolve_term(fixture.owner, "Matheus")
            .await
            .unwrap();
        match resolution {
            Resolution::Direct { contact, method, score } => {
                assert_eq!(contact.id, mateus.id);
                assert_eq!(method, MatchMethod::Name);
                assert!(score >= 0.85);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let fixture = Fixture::new();
        fixture.add(Contact::new(Uuid::new_v4(), "João Pereira")).await;
        fixture.add(Contact::new(fixture.owner, "Marcos")).await;

        let resolution = fixture
            .resolver()
            .resolve_term(fixture.owner, "João Pereira")
            .await
            .unwrap();
        assert_eq!(resolution.kind(), "no_match");
    }

    #[tokio::test]
    async fn test_semantic_match_used_after_names() {
        let fixture = Fixture::new();
        let ana = fixture
            .add(Contact::new(fixture.owner, "Ana Souza").with_position("Investidora anjo"))
            .await;
        fixture.contacts.set_embedding(ana.id, vec![1.0, 0.0]).await.unwrap();

        let embedder = StaticEmbedder::new(vec![0.0, 1.0]).with_keyword("capital", vec![0.9, 0.1]);
        let resolver = fixture
            .resolver()
            .with_embeddings(Arc::new(embedder), Duration::from_secs(1));

        let resolution = resolver
            .resolve_term(fixture.owner, "capital de risco")
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            Resolution::Direct { method: MatchMethod::Semantic, .. }
        ));
        assert_eq!(resolution.direct_contact().map(|c| c.id), Some(ana.id));
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_through_to_text() {
        let fixture = Fixture::new();
        let carlos = fixture
            .add(Contact::new(fixture.owner, "Carlos Lima").with_position("Advogado tributarista"))
            .await;
        let resolver = fixture
            .resolver()
            .with_embeddings(Arc::new(FailingEmbedder), Duration::from_secs(1));

        let resolution = resolver.resolve_term(fixture.owner, "tributarista").await.unwrap();
        match resolution {
            Resolution::Direct { contact, method, .. } => {
                assert_eq!(contact.id, carlos.id);
                assert_eq!(method, MatchMethod::Text);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bridge_match() {
        let fixture = Fixture::new();
        let pedro = fixture.add(Contact::new(fixture.owner, "Pedro Alves")).await;
        let mut paula = MentionedConnection::new(pedro.id, "Paula Reis");
        paula.description = Some("investidora em healthtech".to_string());
        fixture.contacts.insert_mention(paula.clone()).await.unwrap();

        let resolution = fixture
            .resolver()
            .resolve_term(fixture.owner, "healthtech")
            .await
            .unwrap();
        match resolution {
            Resolution::Bridge { connection, via } => {
                assert_eq!(connection.id, paula.id);
                assert_eq!(via.id, pedro.id);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_suggestions_when_nothing_matches() {
        let fixture = Fixture::new();
        for name in ["Mariana Lopes", "Marina", "Roberto", "Mariano"] {
            fixture.add(Contact::new(fixture.owner, name)).await;
        }

        let resolution = fixture
            .resolver()
            .resolve_term(fixture.owner, "Mariela")
            .await
            .unwrap();
        match resolution {
            Resolution::NoMatch { suggestions } => {
                assert!(!suggestions.is_empty());
                assert!(suggestions.len() <= 5);
                assert!(suggestions.iter().all(|s| s.score >= 0.6 && s.score < 1.0));
                assert!(suggestions.windows(2).all(|w| w[0].score >= w[1].score));
                assert!(suggestions.iter().all(|s| s.item.name != "Roberto"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_links_users_by_phone_variant() {
        let fixture = Fixture::new();
        let linked = fixture
            .users
            .create(NewUser {
                name: "Bruno Teixeira".to_string(),
                email: "bruno@x.com".to_string(),
                // legacy 8-digit form
                phone: "552187654321".to_string(),
                temporary_password: "x".to_string(),
            })
            .await
            .unwrap();

        let bruno = fixture
            .add(Contact::new(fixture.owner, "Bruno").with_phone("5521987654321"))
            .await;
        let mut mention = MentionedConnection::new(bruno.id, "Lia");
        mention.description = Some("irmã do Bruno".to_string());
        fixture.contacts.insert_mention(mention).await.unwrap();
        for i in 0..30 {
            fixture
                .add(Contact::new(linked.id, format!("Contato {}", i)))
                .await;
        }

        let graph = fixture.resolver().network(fixture.owner, 2).await.unwrap();
        assert_eq!(graph.count(NodeKind::Root), 1);
        assert_eq!(graph.count(NodeKind::Contact), 1);
        assert_eq!(graph.count(NodeKind::Mention), 1);
        assert_eq!(graph.count(NodeKind::LinkedUser), 1);
        assert_eq!(graph.count(NodeKind::SecondDegree), 20);
        assert!(graph.edges.contains(&NetworkEdge {
            from: bruno.id,
            to: linked.id
        }));

        let shallow = fixture.resolver().network(fixture.owner, 1).await.unwrap();
        assert_eq!(shallow.count(NodeKind::LinkedUser), 0);
        assert_eq!(shallow.count(NodeKind::SecondDegree), 0);
    }
}
