use std::time::Duration;

use nostr_relay_builder::prelude::*;
use nostr_sdk::prelude::*;

use zap_agent_sdk::marketplace::{build_delist_event, build_listing_event, ListingContent};
use zap_agent_sdk::KIND_LISTING;

fn sample_listing() -> ListingContent {
    ListingContent {
        name: "fibonacci_calculator".to_string(),
        description: "auto-generated math helper".to_string(),
        language: "python".to_string(),
        version: "1".to_string(),
        category: "math".to_string(),
        complexity: "simple".to_string(),
        price: 250,
        preview: "def fib(n):\n    return n".to_string(),
        quality: Some(0.93),
    }
}

#[test]
fn listing_event_id_and_signature_verify() {
    let keys = Keys::generate();
    let content = sample_listing();
    let event = build_listing_event(&keys, "prog-1", "math", &content).unwrap();

    // The event id is a canonical sha256 over the serialized fields; this
    // round-trips through nostr_sdk's own verification rather than a
    // hand-computed hash, since that is what every relay in this system
    // actually checks.
    assert!(event.verify().is_ok());
    assert_eq!(event.kind, KIND_LISTING);
    assert_eq!(event.pubkey, keys.public_key());

    let parsed: ListingContent = serde_json::from_str(&event.content).unwrap();
    assert_eq!(parsed.name, content.name);
    assert_eq!(parsed.price, content.price);
}

#[test]
fn delist_event_references_the_listing_id_and_verifies() {
    let keys = Keys::generate();
    let content = sample_listing();
    let listing_event = build_listing_event(&keys, "prog-1", "math", &content).unwrap();

    let delist_event = build_delist_event(&keys, listing_event.id).unwrap();
    assert!(delist_event.verify().is_ok());

    let references_listing = delist_event.tags.iter().any(|t| {
        let v = t.as_slice();
        v.len() >= 2 && v[0] == "e" && v[1] == listing_event.id.to_hex()
    });
    assert!(references_listing, "deletion must tag the listing event id");
}

#[test]
fn tampering_with_content_breaks_verification() {
    let keys = Keys::generate();
    let content = sample_listing();
    let mut event = build_listing_event(&keys, "prog-1", "math", &content).unwrap();

    // Mutate the already-signed content directly; the id/sig were computed
    // over the original bytes so this must now fail verification.
    let mut tampered = event.clone();
    tampered.content = "{\"name\":\"evil\"}".to_string();
    assert!(tampered.verify().is_err());

    assert!(event.verify().is_ok());
    event.content.clear();
    assert!(event.verify().is_err());
}

#[tokio::test]
async fn listing_publishes_and_is_discoverable_over_the_wire() {
    let mock = MockRelay::run().await.unwrap();
    let relay_url = mock.url();

    let keys = Keys::generate();
    let content = sample_listing();
    let event = build_listing_event(&keys, "prog-1", "math", &content).unwrap();

    let client = Client::new(keys.clone());
    client.add_relay(&relay_url).await.unwrap();
    client.connect().await;
    client.send_event(event.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let filter = Filter::new().kind(KIND_LISTING);
    let events = client
        .fetch_events(vec![filter], Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!events.is_empty(), "should have fetched the published listing");
    let fetched = events.iter().next().unwrap();
    assert_eq!(fetched.id, event.id);
    assert!(fetched.verify().is_ok());

    client.disconnect().await.unwrap();
}
