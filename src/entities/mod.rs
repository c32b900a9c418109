pub mod cart;
pub mod cart_item;
pub mod email_verification_token;
pub mod order;
pub mod order_item;
pub mod payment_transaction;
pub mod product;
pub mod user;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use email_verification_token::Entity as EmailVerificationToken;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment_transaction::Entity as PaymentTransaction;
pub use product::Entity as Product;
pub use user::Entity as User;
