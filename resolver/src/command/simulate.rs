use crate::config::Settings;
use anyhow::{Context, Result};
use fusion::{
    address::{AddressKind, NativeAddress},
    chain::CallEncoder,
    order::{CrossChainOrder, Details, Domain, EscrowParams, FillOptions, OrderInfo},
    resolver::{execute, ChainContext, DeployedEscrow, Resolver, SwapState},
    signer::{Signer, Wallet},
    simulation::{native, JsonCallEncoder, Ledger, SecretRelay},
    sui::MoveCallEncoder,
    swaps::OngoingSwaps,
    Secret, Timestamp,
};
use futures::StreamExt;
use std::sync::Arc;

/// Runs one swap from a freshly funded maker to the configured receiver.
///
/// If the swap fails after escrows were deployed they are cancelled once
/// their cancellation stages open.
pub async fn simulate(settings: Settings) -> Result<()> {
    let Settings {
        resolver: config,
        chain,
        order: params,
        ..
    } = settings;

    let escrow_factory = match chain.src.escrow_factory {
        NativeAddress::Evm(address) => address,
        other => anyhow::bail!("escrow factory {} is not an EVM address", other),
    };

    let genesis = Timestamp::now();
    let src = Ledger::new(chain.src.chain_id, genesis);
    let dst = Ledger::new(chain.dst.chain_id, genesis);

    let maker = Wallet::random();
    let maker_on_src = maker.evm_address().to_u256();
    let resolver_on_src = chain.src.resolver.to_u256();
    let resolver_on_dst = chain.dst.resolver.to_u256();

    src.mint(chain.src.token.to_u256(), maker_on_src, params.making_amount)
        .await;
    src.mint(native(), resolver_on_src, params.src_safety_deposit)
        .await;
    dst.mint(chain.dst.token.to_u256(), resolver_on_dst, params.taking_amount)
        .await;
    dst.mint(native(), resolver_on_dst, params.dst_safety_deposit)
        .await;

    let dst_encoder: Arc<dyn CallEncoder> = match chain.dst.kind() {
        AddressKind::Sui => Arc::new(MoveCallEncoder::new(chain.dst.escrow_factory.to_u256())),
        AddressKind::Evm => Arc::new(JsonCallEncoder),
    };
    let resolver = Arc::new(Resolver::new(
        ChainContext {
            client: Arc::new(src.client(resolver_on_src)),
            encoder: Arc::new(JsonCallEncoder),
            identity: resolver_on_src,
        },
        ChainContext {
            client: Arc::new(dst.client(resolver_on_dst)),
            encoder: dst_encoder,
            identity: resolver_on_dst,
        },
        Domain::aggregation_router(chain.src.chain_id),
        config,
    ));

    let secret = Secret::random();
    let order = CrossChainOrder::new(
        escrow_factory,
        OrderInfo {
            salt: None,
            maker: maker_on_src,
            receiver: Some(params.receiver.to_u256()),
            maker_asset: chain.src.token.to_u256(),
            taker_asset: chain.dst.token.to_u256(),
            making_amount: params.making_amount,
            taking_amount: params.taking_amount,
        },
        EscrowParams {
            hashlock: secret.hashlock(),
            timelocks: params.timelocks,
            src_chain_id: chain.src.chain_id,
            dst_chain_id: chain.dst.chain_id,
            src_safety_deposit: params.src_safety_deposit,
            dst_safety_deposit: params.dst_safety_deposit,
        },
        Details::default(),
        FillOptions {
            nonce: 1,
            ..FillOptions::default()
        },
    )
    .context("configured order is invalid")?;

    let signature = maker
        .sign(&order.signing_message(&resolver.domain()))
        .context("maker failed to sign the order")?;
    let relay = SecretRelay::new(src.clone(), dst.clone());
    let order_hash = relay.register(&resolver.domain(), order.clone(), secret).await;

    let mut ongoing_swaps = OngoingSwaps::default();
    ongoing_swaps.insert(order_hash)?;
    tracing::info!("maker {} signed order {}", maker.evm_address(), order_hash);

    let swap = execute(Arc::clone(&resolver), order, signature, Arc::new(relay));
    futures::pin_mut!(swap);

    let mut src_escrow: Option<DeployedEscrow> = None;
    let mut dst_escrow: Option<DeployedEscrow> = None;

    while let Some(state) = swap.next().await {
        match state {
            Ok(state) => {
                match state {
                    SwapState::SrcDeployed(escrow) => src_escrow = Some(escrow),
                    SwapState::DstDeployed(escrow) => dst_escrow = Some(escrow),
                    _ => {}
                }
                tracing::info!("swap {} is now {:?}", order_hash, state);
            }
            Err(e) => {
                ongoing_swaps.remove(&order_hash);
                if src_escrow.is_some() || dst_escrow.is_some() {
                    tracing::warn!("swap {} failed, cancelling its escrows", order_hash);
                    for state in resolver
                        .cancel_swap(src_escrow.as_ref(), dst_escrow.as_ref())
                        .await
                        .context("failed to cancel escrows")?
                    {
                        tracing::info!("swap {} is now {:?}", order_hash, state);
                    }
                }

                return Err(e).context("swap did not complete");
            }
        }
    }
    ongoing_swaps.remove(&order_hash);

    tracing::info!(
        "receiver {} holds {} of the destination token, resolver {} holds {} of the source token",
        params.receiver,
        dst.balance(chain.dst.token.to_u256(), params.receiver.to_u256())
            .await,
        chain.src.resolver,
        src.balance(chain.src.token.to_u256(), resolver_on_src).await
    );

    Ok(())
}
