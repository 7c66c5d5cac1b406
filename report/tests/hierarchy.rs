use pretty_assertions::assert_eq;
use report::{AncestorSearch, Class, Config, ItemType, LocalLaunch, Session};
use std::sync::Arc;

/// Everything sold online.
#[report::feature("Online shop")]
struct Shop;

#[report::feature("Checkout")]
struct Checkout;

/// Paying for the cart.
#[report::story("Payment", extends(Checkout))]
struct Payment;

#[report::class(extends(Payment))]
struct PaymentFlow;

#[report::story("Card payment", extends(PaymentFlow))]
struct CardPayment;

#[report::class]
struct Auditing;

#[report::story("Gift cards", extends(Auditing, Shop))]
enum GiftCards {}

fn start(search: AncestorSearch) -> eyre::Result<(Arc<LocalLaunch>, Arc<Session>)> {
    let mut config = Config::default();
    config.hierarchy.ancestor_search = search;
    let launch = Arc::new(LocalLaunch::new());
    let session = Session::start(config, launch.clone())?;
    report::declare(&session)?;
    Ok((launch, session))
}

#[test]
fn declarations_are_ordered_ancestors_first() {
    let names: Vec<_> = report::declarations()
        .into_iter()
        .map(|(declaration, _)| declaration.name)
        .collect();
    assert_eq!(
        names,
        vec!["Online shop", "Checkout", "Payment", "Gift cards", "Card payment"]
    );
}

#[test]
fn feature_is_a_root_suite_under_both_keys() -> eyre::Result<()> {
    let (launch, session) = start(AncestorSearch::FirstBranch)?;

    let id = session.registry().lookup(Shop::NAME)?;
    assert_eq!(session.registry().lookup("Online shop")?, id);

    let item = launch.item(&id).unwrap();
    assert_eq!(item.item_type, ItemType::Suite);
    assert_eq!(item.parent, None);
    assert_eq!(item.description.as_deref(), Some("Everything sold online."));
    Ok(())
}

#[test]
fn story_hangs_under_its_declared_ancestor() -> eyre::Result<()> {
    let (launch, session) = start(AncestorSearch::FirstBranch)?;

    let checkout = session.registry().lookup("Checkout")?;
    let payment = session.registry().lookup("Payment")?;
    let item = launch.item(&payment).unwrap();
    assert_eq!(item.item_type, ItemType::Story);
    assert_eq!(item.parent, Some(checkout));
    assert_eq!(item.description.as_deref(), Some("Paying for the cart."));
    Ok(())
}

#[test]
fn story_skips_unreported_ancestors() -> eyre::Result<()> {
    let (launch, session) = start(AncestorSearch::FirstBranch)?;

    let payment = session.registry().lookup("Payment")?;
    let card = session.registry().lookup("CardPayment")?;
    assert_eq!(launch.item(&card).unwrap().parent, Some(payment));
    assert!(!session.registry().contains("PaymentFlow"));
    Ok(())
}

#[test]
fn first_branch_search_misses_later_ancestors() -> eyre::Result<()> {
    let (launch, session) = start(AncestorSearch::FirstBranch)?;

    let gift_cards = session.registry().lookup("GiftCards")?;
    assert_eq!(launch.item(&gift_cards).unwrap().parent, None);
    Ok(())
}

#[test]
fn exhaustive_search_finds_later_ancestors() -> eyre::Result<()> {
    let (launch, session) = start(AncestorSearch::Exhaustive)?;

    let shop = session.registry().lookup("Shop")?;
    let gift_cards = session.registry().lookup("GiftCards")?;
    assert_eq!(launch.item(&gift_cards).unwrap().parent, Some(shop));
    Ok(())
}

#[test]
fn class_info_mirrors_the_declaration() {
    let info = CardPayment::class_info();
    assert_eq!(info.name, "CardPayment");
    assert_eq!(info.bases[0].name, "PaymentFlow");
    assert_eq!(info.depth(), 3);
    assert_eq!(Auditing::class_info().bases.len(), 0);
}
