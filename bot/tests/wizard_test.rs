mod helpers;

use bot::discord::wizard::{CreationWizard, WizardOutcome};
use bot::registry::CharacterStore;
use helpers::test_store;
use shared::models::{CharacterFields, Scope};

async fn feed(
    wizard: &mut CreationWizard,
    store: &dyn CharacterStore,
    input: &str,
) -> WizardOutcome {
    wizard.feed(store, input).await.unwrap()
}

#[tokio::test]
async fn full_walkthrough_builds_a_character() {
    let (_dir, store) = test_store().await;
    let mut wizard = CreationWizard::new(100);

    assert!(matches!(
        feed(&mut wizard, &store, "bob").await,
        WizardOutcome::Continue(_)
    ));
    feed(&mut wizard, &store, "Bob the Builder").await;
    feed(&mut wizard, &store, "You are Bob, a cheerful builder.").await;
    feed(&mut wizard, &store, "https://example.com/bob.png").await;
    let last = feed(&mut wizard, &store, "Can he fix it? Yes he can.").await;
    assert!(matches!(last, WizardOutcome::Done(_)));

    let record = store.get(Scope::Dm(100), "bob").await.unwrap();
    assert_eq!(record.author, 100);
    assert_eq!(record.display_name.as_deref(), Some("Bob the Builder"));
    assert_eq!(
        record.system_prompt.as_deref(),
        Some("You are Bob, a cheerful builder.")
    );
    assert_eq!(
        record.avatar_link.as_deref(),
        Some("https://example.com/bob.png")
    );
    assert_eq!(
        record.description.as_deref(),
        Some("Can he fix it? Yes he can.")
    );
}

#[tokio::test]
async fn invalid_and_duplicate_ids_ask_again() {
    let (_dir, store) = test_store().await;
    store
        .create(Scope::Dm(100), 100, "taken", CharacterFields::default())
        .await
        .unwrap();

    let mut wizard = CreationWizard::new(100);

    // invalid id keeps the dialogue on the id step
    let WizardOutcome::Continue(reply) = feed(&mut wizard, &store, "no spaces!").await else {
        panic!("expected the dialogue to continue");
    };
    assert!(reply.contains("letters, numbers, and underscores"));

    let WizardOutcome::Continue(reply) = feed(&mut wizard, &store, "taken").await else {
        panic!("expected the dialogue to continue");
    };
    assert!(reply.contains("exists already"));

    // a valid id finally advances
    assert!(matches!(
        feed(&mut wizard, &store, "free_id").await,
        WizardOutcome::Continue(_)
    ));
    assert!(store.get(Scope::Dm(100), "free_id").await.is_ok());
}

#[tokio::test]
async fn optional_steps_can_be_skipped() {
    let (_dir, store) = test_store().await;
    let mut wizard = CreationWizard::new(100);

    feed(&mut wizard, &store, "minimal").await;
    feed(&mut wizard, &store, "skip").await;
    feed(&mut wizard, &store, "skip").await;
    feed(&mut wizard, &store, "skip").await;
    let last = feed(&mut wizard, &store, "skip").await;
    assert!(matches!(last, WizardOutcome::Done(_)));

    let record = store.get(Scope::Dm(100), "minimal").await.unwrap();
    assert_eq!(record.display_name, None);
    assert_eq!(record.system_prompt, None);
    // the display name falls back to the id
    assert_eq!(record.name(), "minimal");
}

#[tokio::test]
async fn cancel_ends_the_dialogue() {
    let (_dir, store) = test_store().await;
    let mut wizard = CreationWizard::new(100);

    feed(&mut wizard, &store, "half_made").await;
    let last = feed(&mut wizard, &store, "cancel").await;
    assert!(matches!(last, WizardOutcome::Done(_)));

    // the record created at the id step persists; delete is the cleanup path
    assert!(store.get(Scope::Dm(100), "half_made").await.is_ok());
}

#[tokio::test]
async fn over_long_values_ask_again() {
    let (_dir, store) = test_store().await;
    let mut wizard = CreationWizard::new(100);

    feed(&mut wizard, &store, "bob").await;
    let long_name = "n".repeat(51);
    let WizardOutcome::Continue(reply) = feed(&mut wizard, &store, &long_name).await else {
        panic!("expected the dialogue to continue");
    };
    assert!(reply.contains("at most 50"));

    // still on the display-name step; a short name advances
    feed(&mut wizard, &store, "Bob").await;
    let record = store.get(Scope::Dm(100), "bob").await.unwrap();
    assert_eq!(record.display_name.as_deref(), Some("Bob"));
}
