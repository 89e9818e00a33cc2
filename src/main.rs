//! Stealthereum 命令行入口
//! 一次性驱动隐身转账管线：查询、识别代币、授权、转账、注册

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use stealthereum::{
    config::{Config, PipelineConfig},
    domain::{
        chain_config::{NetworkPrefix, NetworkResolver},
        token, MetaAddressInput, Secp256k1StealthGenerator,
    },
    infrastructure::{
        logging::init_logging, request_gate::GateOutcome, EnsNameResolver, EthersChainReader,
        LocalKeyWallet,
    },
    metrics,
    service::{MetaAddressStatus, TransferSession},
};

#[derive(Parser)]
#[command(name = "stealthereum")]
#[command(version)]
#[command(about = "Private ERC-5564 stealth-address transfers on Ethereum")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML 配置文件（存在时替换环境变量配置）
    #[arg(long, global = true, env = "CONFIG_PATH")]
    config: Option<String>,

    /// 签名私钥（仅 send / register 需要）
    #[arg(long, global = true, env = "STEALTH_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// 结束时把指标以 Prometheus 文本输出到 stderr
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a recipient's registered stealth meta-address
    Lookup {
        /// Recipient, e.g. eth:vitalik.eth or sep:0x...
        #[arg(long)]
        to: String,
    },

    /// Identify a token on the recipient's network
    Token {
        #[arg(long)]
        to: String,

        /// Contract address, NATIVE, or a prefixed reference such as eth:0x...
        #[arg(long)]
        token: String,
    },

    /// Send to a one-time stealth address derived for the recipient
    Send {
        #[arg(long)]
        to: String,

        #[arg(long)]
        token: String,

        /// Decimal amount, or the token id for an NFT
        #[arg(long)]
        amount: String,

        /// Submit the token approval when one is required (transfer is a separate run)
        #[arg(long)]
        approve: bool,
    },

    /// Register your stealth meta-address in the ERC-6538 registry
    Register {
        /// st:<prefix>:<hex>
        #[arg(long)]
        meta: String,
    },

    /// List common tokens for a network
    Tokens {
        #[arg(long, default_value = "eth")]
        network: NetworkPrefix,
    },
}

fn applied<V>(outcome: GateOutcome<V>) -> Result<V> {
    match outcome {
        GateOutcome::Applied(result) => Ok(result?),
        GateOutcome::Deduplicated | GateOutcome::Superseded => {
            bail!("request was superseded by a newer input")
        }
    }
}

fn print_meta_status(status: &MetaAddressStatus) {
    match status {
        MetaAddressStatus::Registered {
            network,
            owner,
            meta_address,
        } => {
            println!("recipient:    {:?}", owner);
            println!("meta-address: {}", meta_address.to_uri(*network));
        }
        MetaAddressStatus::NotRegistered { owner, .. } => {
            println!("recipient:    {:?}", owner);
            println!("meta-address: not registered");
        }
    }
}

async fn connect_wallet(
    cli_key: Option<&str>,
    resolver: &NetworkResolver,
    pipeline: &PipelineConfig,
    network: NetworkPrefix,
) -> Result<LocalKeyWallet> {
    let key = cli_key.ok_or_else(|| anyhow!("STEALTH_PRIVATE_KEY is not set"))?;
    let rpc_url = resolver.resolve(network).rpc_url;
    Ok(LocalKeyWallet::connect(&rpc_url, key, pipeline).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env_and_file(cli.config.as_deref())?;
    init_logging(&config.logging).map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    // 一次性调用，不需要防抖
    let pipeline = PipelineConfig {
        confirmations: config.pipeline.confirmations,
        rpc_timeout_secs: config.pipeline.rpc_timeout_secs,
        ..PipelineConfig::immediate()
    };

    let resolver = NetworkResolver::new(config.networks.clone());
    let reader = EthersChainReader::new(&resolver, &pipeline)?;
    let names = EnsNameResolver::new(reader.clone());
    let session = TransferSession::new(
        pipeline.clone(),
        Arc::new(reader),
        Arc::new(names),
        Arc::new(Secp256k1StealthGenerator),
    );

    let result = run(&cli, &session, &resolver, &pipeline).await;

    if cli.metrics {
        eprintln!("{}", metrics::render_prometheus());
    }
    result
}

async fn run(
    cli: &Cli,
    session: &TransferSession,
    resolver: &NetworkResolver,
    pipeline: &PipelineConfig,
) -> Result<()> {
    match &cli.command {
        Commands::Lookup { to } => {
            let status = applied(session.set_recipient(to).await)?;
            print_meta_status(&status);
        }

        Commands::Token { to, token } => {
            // 代币继承收款人的网络前缀
            session.set_recipient(to).await;
            let descriptor = applied(session.set_token(token).await)?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }

        Commands::Send {
            to,
            token,
            amount,
            approve,
        } => {
            let status = applied(session.set_recipient(to).await)?;
            print_meta_status(&status);
            if status.meta_address().is_none() {
                bail!("recipient has not registered a stealth meta-address");
            }

            let wallet =
                connect_wallet(cli.private_key.as_deref(), resolver, pipeline, status.network())
                    .await?;
            session.connect_wallet(Arc::new(wallet));

            let descriptor = applied(session.set_token(token).await)?;
            println!("token:        {}", descriptor.label());

            let value = session.set_amount(amount).await;
            if let Some(err) = value.error {
                return Err(err.into());
            }

            let approval = session.check_approval().await?;
            if !approval.is_approved() {
                if !*approve {
                    bail!(
                        "token approval required ({}); re-run with --approve, then send again",
                        approval
                    );
                }
                let outcome = session.approve().await?;
                println!("approved:     {:?}", outcome.tx_hash);
                println!("approval confirmed; run send again to transfer");
                return Ok(());
            }

            let receipt = session.transfer().await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }

        Commands::Register { meta } => {
            let network = MetaAddressInput::parse(meta)
                .network_prefix
                .ok_or_else(|| anyhow!("meta-address must look like st:<prefix>:<hex>"))?;
            let wallet =
                connect_wallet(cli.private_key.as_deref(), resolver, pipeline, network).await?;
            session.connect_wallet(Arc::new(wallet));

            let outcome = session.register(meta).await?;
            println!("registered:   {:?}", outcome.tx_hash);
        }

        Commands::Tokens { network } => {
            for common in token::common_tokens(*network) {
                println!(
                    "{:<6} {:<24} {:>2}  {}",
                    common.symbol,
                    common.name,
                    common.decimals,
                    common.input_value()
                );
            }
        }
    }

    Ok(())
}
