use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use client::{
    ApiError, ClientConfig, Credentials, PaymentVerification, ProfileUpdate, ShippingDetails,
    SignupRequest, Storefront, config::DEFAULT_BASE_URL,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing credentials; pass --email/--password or set URBANCART_EMAIL/URBANCART_PASSWORD")]
    MissingCredentials,
    #[error("no cart item with id {0}")]
    UnknownItem(i64),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "urbancart", about = "UrbanCart storefront CLI")]
struct Cli {
    #[arg(long, env = "URBANCART_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "URBANCART_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "URBANCART_PASSWORD")]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    Auth(AuthCommand),
    Cart(CartCommand),
    Order(OrderCommand),
    Payment(PaymentCommand),
}

#[derive(Args, Debug, Clone)]
struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum AuthSubcommand {
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        password: String,
    },
    Whoami,
    EditProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    DeleteAccount,
    ResetPassword(ResetPasswordCommand),
}

#[derive(Args, Debug, Clone)]
struct ResetPasswordCommand {
    #[command(subcommand)]
    command: ResetPasswordSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ResetPasswordSubcommand {
    Request {
        #[arg(long)]
        email: String,
    },
    Confirm {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_new_password: String,
    },
}

#[derive(Args, Debug, Clone)]
struct CartCommand {
    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum CartSubcommand {
    Show,
    Add {
        product_id: i64,
        #[arg(long)]
        size: Option<String>,
    },
    Inc {
        item_id: i64,
    },
    Dec {
        item_id: i64,
    },
    Remove {
        item_id: i64,
    },
    Clear,
}

#[derive(Args, Debug, Clone)]
struct OrderCommand {
    #[command(subcommand)]
    command: OrderSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum OrderSubcommand {
    Place(ShippingArgs),
    List,
}

#[derive(Args, Debug, Clone)]
struct PaymentCommand {
    #[command(subcommand)]
    command: PaymentSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
enum PaymentSubcommand {
    Create(ShippingArgs),
    Verify {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        signature: String,
    },
}

#[derive(Args, Debug, Clone)]
struct ShippingArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    street: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    pincode: String,
}

impl ShippingArgs {
    fn into_details(self) -> ShippingDetails {
        ShippingDetails {
            shipping_name: self.name,
            shipping_phone: self.phone,
            shipping_street: self.street,
            shipping_city: self.city,
            shipping_state: self.state,
            shipping_pincode: self.pincode,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store = Storefront::new(&ClientConfig::new(&cli.base_url))?;
    watch_login_required(&store);
    store.api.bootstrap_csrf().await;

    match cli.command.clone() {
        Command::Auth(auth) => run_auth(&store, &cli, auth).await,
        Command::Cart(cart) => {
            login(&store, &cli).await?;
            run_cart(&store, cart).await
        }
        Command::Order(order) => {
            login(&store, &cli).await?;
            run_order(&store, order).await
        }
        Command::Payment(payment) => {
            login(&store, &cli).await?;
            run_payment(&store, payment).await
        }
    }
}

/// The process is one-shot, so every authenticated command starts with a
/// fresh login from the configured credentials.
async fn login(store: &Storefront, cli: &Cli) -> Result<(), CliError> {
    let (Some(email), Some(password)) = (&cli.email, &cli.password) else {
        return Err(CliError::MissingCredentials);
    };
    store
        .auth
        .login(&Credentials { email: email.clone(), password: password.clone() })
        .await?;
    store.cart.fetch().await?;
    Ok(())
}

fn watch_login_required(store: &Storefront) {
    let mut signal = store.api.login_required();
    tokio::spawn(async move {
        if signal.recv().await.is_ok() {
            eprintln!("session expired; please log in again");
        }
    });
}

async fn run_auth(store: &Storefront, cli: &Cli, auth: AuthCommand) -> Result<(), CliError> {
    match auth.command {
        AuthSubcommand::Signup { username, email, phone, password } => {
            store
                .auth
                .signup(&SignupRequest { username, email, phone, password })
                .await?;
            println!("account created; log in with --email/--password");
            Ok(())
        }
        AuthSubcommand::Whoami => {
            login(store, cli).await?;
            let user = store.auth.current_user().await.ok_or(ApiError::Unauthorized)?;
            print_json(&serde_json::to_value(&user)?)
        }
        AuthSubcommand::EditProfile { username, email, phone, city, state, address } => {
            login(store, cli).await?;
            let user = store
                .auth
                .edit_profile(&ProfileUpdate { username, email, phone, city, state, address })
                .await?;
            print_json(&serde_json::to_value(&user)?)
        }
        AuthSubcommand::DeleteAccount => {
            login(store, cli).await?;
            if store.auth.delete_account().await {
                println!("account deleted");
            } else {
                println!("account deletion refused");
            }
            Ok(())
        }
        AuthSubcommand::ResetPassword(reset) => run_reset_password(store, reset).await,
    }
}

async fn run_reset_password(
    store: &Storefront,
    reset: ResetPasswordCommand,
) -> Result<(), CliError> {
    match reset.command {
        ResetPasswordSubcommand::Request { email } => {
            store.auth.request_password_reset(&email).await?;
            println!("reset link sent if the address is registered");
            Ok(())
        }
        ResetPasswordSubcommand::Confirm { uid, token, new_password, confirm_new_password } => {
            store
                .auth
                .confirm_password_reset(&uid, &token, &new_password, &confirm_new_password)
                .await?;
            println!("password updated");
            Ok(())
        }
    }
}

async fn run_cart(store: &Storefront, cart: CartCommand) -> Result<(), CliError> {
    match cart.command {
        CartSubcommand::Show => {}
        CartSubcommand::Add { product_id, size } => {
            store.cart.add_item(product_id, size.as_deref()).await?;
        }
        CartSubcommand::Inc { item_id } => {
            let quantity = item_quantity(store, item_id).await?;
            store.cart.increment(item_id, quantity).await?;
        }
        CartSubcommand::Dec { item_id } => {
            let quantity = item_quantity(store, item_id).await?;
            store.cart.decrement(item_id, quantity).await?;
        }
        CartSubcommand::Remove { item_id } => {
            store.cart.remove_item(item_id).await?;
        }
        CartSubcommand::Clear => {
            store.cart.clear().await?;
        }
    }
    print_cart(store).await
}

async fn run_order(store: &Storefront, order: OrderCommand) -> Result<(), CliError> {
    match order.command {
        OrderSubcommand::Place(shipping) => {
            let order_id = store.cart.place_order(&shipping.into_details()).await?;
            println!("order placed: {order_id}");
            Ok(())
        }
        OrderSubcommand::List => {
            let user = store.auth.current_user().await.ok_or(ApiError::Unauthorized)?;
            print_json(&serde_json::to_value(&user.orders)?)
        }
    }
}

async fn run_payment(store: &Storefront, payment: PaymentCommand) -> Result<(), CliError> {
    match payment.command {
        PaymentSubcommand::Create(shipping) => {
            let order = store.cart.create_payment_order(&shipping.into_details()).await?;
            print_json(&serde_json::to_value(&order)?)
        }
        PaymentSubcommand::Verify { order_id, payment_id, signature } => {
            store
                .cart
                .verify_payment(&PaymentVerification {
                    razorpay_order_id: order_id,
                    razorpay_payment_id: payment_id,
                    razorpay_signature: signature,
                })
                .await?;
            println!("payment verified");
            print_cart(store).await
        }
    }
}

async fn item_quantity(store: &Storefront, item_id: i64) -> Result<u32, CliError> {
    store
        .cart
        .snapshot()
        .await
        .and_then(|cart| cart.items.iter().find(|item| item.id == item_id).map(|item| item.quantity))
        .ok_or(CliError::UnknownItem(item_id))
}

async fn print_cart(store: &Storefront) -> Result<(), CliError> {
    match store.cart.snapshot().await {
        Some(cart) => print_json(&serde_json::to_value(&cart)?),
        None => {
            println!("no cart");
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
