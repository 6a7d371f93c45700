use mongodb::bson::doc;
use mongodb::{options::ClientOptions, Client, Database};
use log::info;

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let mut client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        client_options.app_name = Some("green-commons".to_string());
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);

        // Fail fast on an unreachable cluster instead of at the first query.
        db.run_command(doc! { "ping": 1 })
            .await
            .expect("Failed to reach MongoDB");
        info!("Connected to MongoDB database {}", db_name);

        MongoDB { client, db }
    }
}
