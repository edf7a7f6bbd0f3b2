use assertr::prelude::*;
use common::idp::MockIdp;
use oidc_relying_party::{AuthError, DiscoveryError, RelyingParty, Session};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn metadata_and_keys_are_cached() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    let rp = RelyingParty::new(idp.options())?;

    for _ in 0..3 {
        let mut session = Session::new();
        let login_url = rp.begin_login(&mut session, None).await?;
        rp.complete_login(&mut session, &idp.authorize(&login_url))
            .await?;
    }

    assert_that(idp.discovery_requests()).is_equal_to(1);
    assert_that(idp.jwks_requests()).is_equal_to(1);
    assert_that(rp.provider().cached_metadata().is_some()).is_true();
    assert_that(rp.provider().cached_jwk_set().is_some()).is_true();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn forget_drops_cached_metadata() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    let rp = RelyingParty::new(idp.options())?;

    rp.provider().resolve().await?;
    rp.provider().forget();
    assert_that(rp.provider().cached_metadata().is_none()).is_true();
    rp.provider().resolve().await?;

    assert_that(idp.discovery_requests()).is_equal_to(2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_key_triggers_exactly_one_refresh() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    idp.configure(|it| it.kid = "rotated-away".to_owned());
    let rp = RelyingParty::new(idp.options())?;
    let mut session = Session::new();

    let login_url = rp.begin_login(&mut session, None).await?;
    let err = rp
        .complete_login(&mut session, &idp.authorize(&login_url))
        .await
        .unwrap_err();

    match err {
        AuthError::UnknownKey { kid } => {
            assert_that(kid).is_equal_to(Some("rotated-away".to_owned()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_that(idp.jwks_requests()).is_equal_to(2);
    assert_that(session.is_authenticated()).is_false();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn withdrawn_key_is_rejected_after_rotation() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    let rp = RelyingParty::new(idp.options())?;

    let mut session = Session::new();
    let login_url = rp.begin_login(&mut session, None).await?;
    rp.complete_login(&mut session, &idp.authorize(&login_url))
        .await?;

    // The provider rolls over to a new key and stops publishing the old one.
    idp.configure(|it| {
        it.kid = "test-key-2".to_owned();
        it.published_kid = "test-key-2".to_owned();
    });
    let mut session = Session::new();
    let login_url = rp.begin_login(&mut session, None).await?;
    rp.complete_login(&mut session, &idp.authorize(&login_url))
        .await?;
    assert_that(idp.jwks_requests()).is_equal_to(2);

    // Tokens still signed under the old `kid` must not verify anymore.
    idp.configure(|it| it.kid = "test-key-1".to_owned());
    let mut session = Session::new();
    let login_url = rp.begin_login(&mut session, None).await?;
    let err = rp
        .complete_login(&mut session, &idp.authorize(&login_url))
        .await
        .unwrap_err();

    match err {
        AuthError::UnknownKey { kid } => {
            assert_that(kid).is_equal_to(Some("test-key-1".to_owned()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_that(idp.jwks_requests()).is_equal_to(3);
    assert_that(session.is_authenticated()).is_false();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_naming_another_issuer_is_rejected() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    idp.configure(|it| it.discovery_issuer = Some("https://evil.example.com".to_owned()));
    let rp = RelyingParty::new(idp.options())?;
    let mut session = Session::new();

    let err = rp.begin_login(&mut session, None).await.unwrap_err();

    assert_that(matches!(
        err,
        AuthError::Discovery {
            source: DiscoveryError::IssuerMismatch { .. }
        }
    ))
    .is_true();
    assert_that(session.pending().is_none()).is_true();
    assert_that(rp.provider().cached_metadata().is_none()).is_true();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn plaintext_provider_is_refused_unless_allowed() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    let mut options = idp.options();
    options.allow_plaintext_http = false;
    let rp = RelyingParty::new(options)?;
    let mut session = Session::new();

    let err = rp.begin_login(&mut session, None).await.unwrap_err();

    assert_that(matches!(
        err,
        AuthError::Discovery {
            source: DiscoveryError::Metadata { .. }
        }
    ))
    .is_true();
    assert_that(idp.discovery_requests()).is_equal_to(0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_provider_times_out() -> anyhow::Result<()> {
    common::tracing::init_subscriber();
    let idp = MockIdp::start().await;
    let mut options = idp.options();
    // Non-routable address. Connecting hangs until the timeout fires.
    options.issuer = "http://10.255.255.1".parse()?;
    options.advanced.request_timeout = std::time::Duration::from_millis(200);
    let rp = RelyingParty::new(options)?;
    let mut session = Session::new();

    let err = rp.begin_login(&mut session, None).await.unwrap_err();

    assert_that(matches!(err, AuthError::Discovery { .. })).is_true();
    assert_that(session.pending().is_none()).is_true();
    Ok(())
}
